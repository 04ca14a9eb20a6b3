//! Reconciles the local annotation list with the remote store.
//!
//! Every remote operation runs on a short-lived worker thread and reports
//! back as a single [`StoreEvent`] on a channel the UI drains each frame.
//! Local state is only mutated after the corresponding event arrives, so a
//! failed call leaves the local list untouched. There is no retry and no
//! request queueing; overlapping calls resolve last-write-wins.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use image::DynamicImage;
use log::error;

use crate::api::{AnnotationDto, ApiError, LabelDto, NewAnnotation, ProjectApi};
use crate::geometry::UvRect;
use crate::labels::Label;

/// A persisted annotation: normalized rectangle plus label name. Carries the
/// server id from the moment it enters local state, since commits are only
/// applied after the create call succeeds.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub id: i64,
    pub rect: UvRect,
    pub label: String,
}

/// Stored `(x, y, width, height)` to local corner form.
pub fn annotation_from_stored(dto: &AnnotationDto) -> Annotation {
    Annotation {
        id: dto.id,
        rect: UvRect {
            x1: dto.x,
            y1: dto.y,
            x2: dto.x + dto.width,
            y2: dto.y + dto.height,
        },
        label: dto.label.name.clone(),
    }
}

/// Local corner form to the stored create payload.
pub fn stored_from_rect(rect: &UvRect, label_id: i64) -> NewAnnotation {
    NewAnnotation {
        label_id,
        x: rect.x1,
        y: rect.y1,
        width: rect.width(),
        height: rect.height(),
        coordinate_format: "uv",
    }
}

/// Completion of one background operation.
#[derive(Debug)]
pub enum StoreEvent {
    ImageLoaded(DynamicImage),
    LabelsLoaded(Vec<Label>),
    /// Label created remotely; carries the refreshed registry contents and
    /// the name to select.
    LabelCreated { labels: Vec<Label>, name: String },
    /// Label and every annotation referencing it deleted remotely; the
    /// local cascade may now be applied.
    LabelDeleted { name: String },
    AnnotationsLoaded(Vec<Annotation>),
    AnnotationCreated(Annotation),
    AnnotationDeleted { id: i64 },
    Failed { what: &'static str, error: ApiError },
}

fn fail(what: &'static str, error: ApiError) -> StoreEvent {
    error!("{what} failed: {error}");
    StoreEvent::Failed { what, error }
}

fn labels_from_dtos(dtos: Vec<LabelDto>) -> Vec<Label> {
    dtos.into_iter()
        .map(|dto| Label {
            id: dto.id,
            name: dto.name,
        })
        .collect()
}

// ── Jobs ────────────────────────────────────────────────────────────────────
// One function per operation, synchronous, returning the event to publish.
// Kept free of thread/channel plumbing so tests can drive them directly.

fn load_image(api: &dyn ProjectApi, image_id: &str) -> StoreEvent {
    let bytes = match api.fetch_image(image_id) {
        Ok(bytes) => bytes,
        Err(e) => return fail("loading image", e),
    };
    match image::load_from_memory(&bytes) {
        Ok(img) => StoreEvent::ImageLoaded(img),
        Err(e) => fail("loading image", ApiError::Decode(e.to_string())),
    }
}

fn load_labels(api: &dyn ProjectApi, project_id: &str) -> StoreEvent {
    match api.list_labels(project_id) {
        Ok(dtos) => StoreEvent::LabelsLoaded(labels_from_dtos(dtos)),
        Err(e) => fail("loading labels", e),
    }
}

fn create_label(api: &dyn ProjectApi, project_id: &str, name: String) -> StoreEvent {
    if let Err(e) = api.create_label(project_id, &name) {
        return fail("creating label", e);
    }
    // Refresh from the server so ids and ordering are authoritative.
    match api.list_labels(project_id) {
        Ok(dtos) => StoreEvent::LabelCreated {
            labels: labels_from_dtos(dtos),
            name,
        },
        Err(e) => fail("refreshing labels", e),
    }
}

fn delete_label(
    api: &dyn ProjectApi,
    project_id: &str,
    image_id: &str,
    label: Label,
    annotation_ids: Vec<i64>,
) -> StoreEvent {
    // Remove the annotations referencing the label first, so the server
    // never holds annotations with a dangling label.
    for id in annotation_ids {
        if let Err(e) = api.delete_annotation(image_id, id) {
            return fail("deleting label", e);
        }
    }
    match api.delete_label(project_id, label.id) {
        Ok(()) => StoreEvent::LabelDeleted { name: label.name },
        Err(e) => fail("deleting label", e),
    }
}

fn load_annotations(api: &dyn ProjectApi, image_id: &str) -> StoreEvent {
    match api.list_annotations(image_id) {
        Ok(dtos) => {
            StoreEvent::AnnotationsLoaded(dtos.iter().map(annotation_from_stored).collect())
        }
        Err(e) => fail("loading annotations", e),
    }
}

fn create_annotation(
    api: &dyn ProjectApi,
    image_id: &str,
    rect: UvRect,
    label: String,
    label_id: i64,
) -> StoreEvent {
    match api.create_annotation(image_id, &stored_from_rect(&rect, label_id)) {
        Ok(id) => StoreEvent::AnnotationCreated(Annotation { id, rect, label }),
        Err(e) => fail("saving annotation", e),
    }
}

fn delete_annotation(api: &dyn ProjectApi, image_id: &str, id: i64) -> StoreEvent {
    match api.delete_annotation(image_id, id) {
        Ok(()) => StoreEvent::AnnotationDeleted { id },
        Err(e) => fail("deleting annotation", e),
    }
}

// ── Store ───────────────────────────────────────────────────────────────────

/// Handle for launching remote operations against one project/image pair
/// and collecting their completions.
pub struct RemoteStore {
    api: Arc<dyn ProjectApi>,
    project_id: String,
    image_id: String,
    tx: Sender<StoreEvent>,
    rx: Receiver<StoreEvent>,
}

impl RemoteStore {
    pub fn new(api: Arc<dyn ProjectApi>, project_id: String, image_id: String) -> Self {
        let (tx, rx) = unbounded();
        Self {
            api,
            project_id,
            image_id,
            tx,
            rx,
        }
    }

    /// Drain completed operations. Called once per frame on the UI thread.
    pub fn poll(&self) -> Vec<StoreEvent> {
        self.rx.try_iter().collect()
    }

    fn spawn(&self, job: impl FnOnce(&dyn ProjectApi) -> StoreEvent + Send + 'static) {
        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        thread::spawn(move || {
            // The receiver only disappears on shutdown; nothing to do then.
            let _ = tx.send(job(api.as_ref()));
        });
    }

    pub fn load_image(&self) {
        let image_id = self.image_id.clone();
        self.spawn(move |api| load_image(api, &image_id));
    }

    pub fn load_labels(&self) {
        let project_id = self.project_id.clone();
        self.spawn(move |api| load_labels(api, &project_id));
    }

    pub fn create_label(&self, name: String) {
        let project_id = self.project_id.clone();
        self.spawn(move |api| create_label(api, &project_id, name));
    }

    /// Delete `label` remotely together with every annotation that carries
    /// it. `annotation_ids` is the caller's snapshot of those annotations.
    pub fn delete_label(&self, label: Label, annotation_ids: Vec<i64>) {
        let project_id = self.project_id.clone();
        let image_id = self.image_id.clone();
        self.spawn(move |api| delete_label(api, &project_id, &image_id, label, annotation_ids));
    }

    pub fn load_annotations(&self) {
        let image_id = self.image_id.clone();
        self.spawn(move |api| load_annotations(api, &image_id));
    }

    pub fn create_annotation(&self, rect: UvRect, label: String, label_id: i64) {
        let image_id = self.image_id.clone();
        self.spawn(move |api| create_annotation(api, &image_id, rect, label, label_id));
    }

    pub fn delete_annotation(&self, id: i64) {
        let image_id = self.image_id.clone();
        self.spawn(move |api| delete_annotation(api, &image_id, id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::AnnotationLabelDto;
    use std::sync::Mutex;

    /// In-memory backend. Failure toggles simulate the server rejecting a
    /// class of request; the call log records the order of mutations.
    #[derive(Default)]
    struct FakeApi {
        labels: Mutex<Vec<LabelDto>>,
        annotations: Mutex<Vec<AnnotationDto>>,
        calls: Mutex<Vec<String>>,
        reject_auth: bool,
        fail_annotation_delete: bool,
    }

    impl FakeApi {
        fn with_labels(names: &[(i64, &str)]) -> Self {
            let api = Self::default();
            *api.labels.lock().unwrap() = names
                .iter()
                .map(|(id, name)| LabelDto {
                    id: *id,
                    name: (*name).to_owned(),
                })
                .collect();
            api
        }

        fn log(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl ProjectApi for FakeApi {
        fn list_labels(&self, _project_id: &str) -> Result<Vec<LabelDto>, ApiError> {
            Ok(self.labels.lock().unwrap().clone())
        }

        fn create_label(&self, _project_id: &str, name: &str) -> Result<LabelDto, ApiError> {
            let mut labels = self.labels.lock().unwrap();
            let id = labels.iter().map(|l| l.id).max().unwrap_or(0) + 1;
            let dto = LabelDto {
                id,
                name: name.to_owned(),
            };
            labels.push(dto.clone());
            self.log(format!("create_label {name}"));
            Ok(dto)
        }

        fn delete_label(&self, _project_id: &str, label_id: i64) -> Result<(), ApiError> {
            self.labels.lock().unwrap().retain(|l| l.id != label_id);
            self.log(format!("delete_label {label_id}"));
            Ok(())
        }

        fn list_annotations(&self, _image_id: &str) -> Result<Vec<AnnotationDto>, ApiError> {
            Ok(self.annotations.lock().unwrap().clone())
        }

        fn create_annotation(
            &self,
            _image_id: &str,
            new: &NewAnnotation,
        ) -> Result<i64, ApiError> {
            if self.reject_auth {
                return Err(ApiError::AuthRejected);
            }
            self.log(format!("create_annotation {}", new.coordinate_format));
            Ok(42)
        }

        fn delete_annotation(&self, _image_id: &str, annotation_id: i64) -> Result<(), ApiError> {
            if self.fail_annotation_delete {
                return Err(ApiError::Server(500));
            }
            self.annotations
                .lock()
                .unwrap()
                .retain(|a| a.id != annotation_id);
            self.log(format!("delete_annotation {annotation_id}"));
            Ok(())
        }

        fn fetch_image(&self, _image_id: &str) -> Result<Vec<u8>, ApiError> {
            Err(ApiError::NotFound("image"))
        }
    }

    fn stored(id: i64, label: &str, x: f32, y: f32, w: f32, h: f32) -> AnnotationDto {
        AnnotationDto {
            id,
            label: AnnotationLabelDto {
                name: label.to_owned(),
            },
            x,
            y,
            width: w,
            height: h,
        }
    }

    #[test]
    fn stored_form_translates_to_corners() {
        let ann = annotation_from_stored(&stored(7, "cat", 0.1, 0.2, 0.3, 0.1));
        assert_eq!(ann.id, 7);
        assert_eq!(ann.label, "cat");
        assert!((ann.rect.x1 - 0.1).abs() < 1e-6);
        assert!((ann.rect.y1 - 0.2).abs() < 1e-6);
        assert!((ann.rect.x2 - 0.4).abs() < 1e-6);
        assert!((ann.rect.y2 - 0.3).abs() < 1e-6);
    }

    #[test]
    fn create_payload_uses_extent_form_and_uv_marker() {
        let rect = UvRect {
            x1: 0.125,
            y1: 0.1667,
            x2: 0.375,
            y2: 0.3333,
        };
        let new = stored_from_rect(&rect, 3);
        assert_eq!(new.label_id, 3);
        assert_eq!(new.coordinate_format, "uv");
        assert!((new.x - 0.125).abs() < 1e-6);
        assert!((new.width - 0.25).abs() < 1e-4);
        assert!((new.height - 0.1666).abs() < 1e-3);
    }

    #[test]
    fn successful_create_reports_the_server_id() {
        let api = FakeApi::default();
        let rect = UvRect {
            x1: 0.1,
            y1: 0.1,
            x2: 0.2,
            y2: 0.2,
        };
        match create_annotation(&api, "img", rect, "cat".to_owned(), 1) {
            StoreEvent::AnnotationCreated(ann) => {
                assert_eq!(ann.id, 42);
                assert_eq!(ann.label, "cat");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn rejected_create_surfaces_as_auth_failure_without_an_annotation() {
        let api = FakeApi {
            reject_auth: true,
            ..FakeApi::default()
        };
        let rect = UvRect {
            x1: 0.1,
            y1: 0.1,
            x2: 0.2,
            y2: 0.2,
        };
        match create_annotation(&api, "img", rect, "cat".to_owned(), 1) {
            StoreEvent::Failed { error, .. } => assert!(error.is_auth()),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(api.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn label_create_refreshes_the_registry_and_names_the_selection() {
        let api = FakeApi::with_labels(&[(1, "cat")]);
        match create_label(&api, "p1", "dog".to_owned()) {
            StoreEvent::LabelCreated { labels, name } => {
                assert_eq!(name, "dog");
                assert_eq!(labels.len(), 2);
                assert!(labels.iter().any(|l| l.name == "dog" && l.id == 2));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn label_delete_removes_its_annotations_before_the_label() {
        let api = FakeApi::with_labels(&[(1, "cat")]);
        *api.annotations.lock().unwrap() = vec![
            stored(10, "cat", 0.1, 0.1, 0.2, 0.2),
            stored(11, "cat", 0.5, 0.5, 0.2, 0.2),
        ];
        let label = Label {
            id: 1,
            name: "cat".to_owned(),
        };
        match delete_label(&api, "p1", "img", label, vec![10, 11]) {
            StoreEvent::LabelDeleted { name } => assert_eq!(name, "cat"),
            other => panic!("unexpected event {other:?}"),
        }
        let calls = api.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec!["delete_annotation 10", "delete_annotation 11", "delete_label 1"]
        );
        assert!(api.annotations.lock().unwrap().is_empty());
        assert!(api.labels.lock().unwrap().is_empty());
    }

    #[test]
    fn failed_cascade_leaves_the_label_in_place() {
        let api = FakeApi {
            fail_annotation_delete: true,
            ..FakeApi::with_labels(&[(1, "cat")])
        };
        let label = Label {
            id: 1,
            name: "cat".to_owned(),
        };
        match delete_label(&api, "p1", "img", label, vec![10]) {
            StoreEvent::Failed { error, .. } => {
                assert!(matches!(error, ApiError::Server(500)))
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(api.labels.lock().unwrap().len(), 1);
    }

    #[test]
    fn annotation_load_translates_every_entry() {
        let api = FakeApi::default();
        *api.annotations.lock().unwrap() = vec![
            stored(1, "cat", 0.0, 0.0, 0.5, 0.5),
            stored(2, "dog", 0.25, 0.25, 0.25, 0.5),
        ];
        match load_annotations(&api, "img") {
            StoreEvent::AnnotationsLoaded(anns) => {
                assert_eq!(anns.len(), 2);
                assert!((anns[1].rect.x2 - 0.5).abs() < 1e-6);
                assert!((anns[1].rect.y2 - 0.75).abs() < 1e-6);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn store_delivers_events_across_the_channel() {
        let api = Arc::new(FakeApi::with_labels(&[(1, "cat")]));
        let store = RemoteStore::new(api, "p1".to_owned(), "img".to_owned());
        store.load_labels();
        // Worker threads are short-lived; block on the one pending result.
        let event = store
            .rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("label fetch result");
        match event {
            StoreEvent::LabelsLoaded(labels) => assert_eq!(labels.len(), 1),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(store.poll().is_empty());
    }
}
