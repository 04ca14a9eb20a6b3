use std::sync::Arc;
use std::time::{Duration, Instant};

use eframe::egui;
use image::DynamicImage;
use log::info;

use crate::api::ProjectApi;
use crate::geometry::ImageView;
use crate::labels::{LabelInputError, LabelRegistry};
use crate::session::{DrawRefusal, DrawState};
use crate::sync::{Annotation, RemoteStore, StoreEvent};

const NOTICE_TTL: Duration = Duration::from_secs(4);

const COLOR_DEFAULT: egui::Color32 = egui::Color32::from_rgb(0, 255, 0);
const COLOR_HOVERED: egui::Color32 = egui::Color32::from_rgb(255, 220, 0);
const COLOR_SELECTED: egui::Color32 = egui::Color32::from_rgb(0, 120, 255);

#[derive(Clone, Copy, Debug, PartialEq)]
enum NoticeKind {
    Info,
    Error,
}

/// Transient user-facing message; validation and network failures both end
/// up here rather than crashing the frame loop.
#[derive(Debug)]
struct Notice {
    text: String,
    kind: NoticeKind,
    expires: Instant,
}

// ── App ─────────────────────────────────────────────────────────────────────

pub struct AnnotateApp {
    store: RemoteStore,

    // Image; `view` exists only once decoding finished, which gates every
    // UV-dependent operation.
    raw_image: Option<DynamicImage>,
    view: Option<ImageView>,
    texture: Option<egui::TextureHandle>,

    annotations: Vec<Annotation>,
    labels: LabelRegistry,
    draw: DrawState,

    // Derived interaction view, recomputed from the pointer each frame.
    hovered: Option<usize>,
    selected: Option<usize>,

    new_label_input: String,
    notices: Vec<Notice>,
}

impl AnnotateApp {
    pub fn new(api: Arc<dyn ProjectApi>, project_id: String, image_id: String) -> Self {
        let store = RemoteStore::new(api, project_id, image_id);
        // Labels and image load immediately; annotations wait for the image
        // dimensions.
        store.load_image();
        store.load_labels();
        Self {
            store,
            raw_image: None,
            view: None,
            texture: None,
            annotations: Vec::new(),
            labels: LabelRegistry::default(),
            draw: DrawState::Idle,
            hovered: None,
            selected: None,
            new_label_input: String::new(),
            notices: Vec::new(),
        }
    }

    fn notify(&mut self, kind: NoticeKind, text: impl Into<String>) {
        self.notices.push(Notice {
            text: text.into(),
            kind,
            expires: Instant::now() + NOTICE_TTL,
        });
    }

    fn apply_event(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::ImageLoaded(img) => {
                match ImageView::new(img.width(), img.height()) {
                    Some(view) => {
                        info!("image loaded ({}x{})", img.width(), img.height());
                        self.view = Some(view);
                        self.raw_image = Some(img);
                        self.texture = None;
                        self.store.load_annotations();
                    }
                    None => self.notify(NoticeKind::Error, "Image has no pixels"),
                }
            }
            StoreEvent::LabelsLoaded(labels) => self.labels.replace(labels),
            StoreEvent::LabelCreated { labels, name } => {
                self.labels.replace(labels);
                self.labels.select(&name);
                self.notify(NoticeKind::Info, format!("Label '{name}' added"));
            }
            StoreEvent::LabelDeleted { name } => self.cascade_label_delete(&name),
            StoreEvent::AnnotationsLoaded(annotations) => {
                self.annotations = annotations;
                self.hovered = None;
                self.selected = None;
            }
            StoreEvent::AnnotationCreated(annotation) => self.annotations.push(annotation),
            StoreEvent::AnnotationDeleted { id } => {
                self.annotations.retain(|a| a.id != id);
                self.hovered = None;
                self.selected = None;
            }
            StoreEvent::Failed { what, error } => {
                if error.is_auth() {
                    self.notify(NoticeKind::Error, format!("Sign in again: {error}"));
                } else {
                    self.notify(NoticeKind::Error, format!("Error {what}: {error}"));
                }
            }
        }
    }

    /// Local cascade after the server confirmed the label (and its
    /// annotations) are gone.
    fn cascade_label_delete(&mut self, name: &str) {
        self.annotations.retain(|a| a.label != name);
        self.labels.remove(name);
        self.hovered = None;
        self.selected = None;
        self.notify(NoticeKind::Info, format!("Label '{name}' deleted"));
    }

    fn request_delete_selected(&mut self) {
        if let Some(idx) = self.selected {
            if let Some(ann) = self.annotations.get(idx) {
                self.store.delete_annotation(ann.id);
            }
        }
    }

    fn request_delete_label(&mut self, name: &str) {
        let Some(id) = self.labels.id_of(name) else {
            return;
        };
        let ids: Vec<i64> = self
            .annotations
            .iter()
            .filter(|a| a.label == name)
            .map(|a| a.id)
            .collect();
        self.store.delete_label(
            crate::labels::Label {
                id,
                name: name.to_owned(),
            },
            ids,
        );
    }

    fn submit_new_label(&mut self) {
        match self.labels.validate_new(&self.new_label_input) {
            Ok(name) => {
                self.new_label_input.clear();
                self.store.create_label(name);
            }
            Err(LabelInputError::Empty) => {
                self.notify(NoticeKind::Info, "Label name is empty");
            }
            Err(LabelInputError::Duplicate) => {
                self.notify(NoticeKind::Info, "Label already exists");
            }
        }
    }

    /// End the active gesture and hand the rectangle to the sync layer.
    /// Undersized gestures are discarded silently.
    fn commit_gesture(&mut self) {
        let Some(rect) = self.draw.finish() else {
            return;
        };
        let Some(label) = self.labels.selected().map(str::to_owned) else {
            self.notify(NoticeKind::Info, "Select a label first");
            return;
        };
        match self.labels.id_of(&label) {
            Some(label_id) => self.store.create_annotation(rect, label, label_id),
            None => self.notify(NoticeKind::Error, format!("Label '{label}' not found")),
        }
    }

    fn ensure_texture(&mut self, ctx: &egui::Context) {
        if self.texture.is_some() {
            return;
        }
        if let Some(ref img) = self.raw_image {
            let rgba = img.to_rgba8();
            let size = [rgba.width() as usize, rgba.height() as usize];
            let pixels = rgba.as_flat_samples();
            let color_image = egui::ColorImage::from_rgba_unmultiplied(size, pixels.as_slice());
            self.texture =
                Some(ctx.load_texture("image", color_image, egui::TextureOptions::LINEAR));
        }
    }

    // ── Panels ──────────────────────────────────────────────────────────

    fn labels_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Labels");
        ui.horizontal(|ui| {
            let field = ui.text_edit_singleline(&mut self.new_label_input);
            let submitted = field.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if ui.button("Add").clicked() || submitted {
                self.submit_new_label();
            }
        });
        ui.separator();
        if self.labels.is_empty() {
            ui.label("No labels yet. Add one to start drawing.");
            return;
        }
        let mut clicked: Option<String> = None;
        let mut deleted: Option<String> = None;
        for label in self.labels.labels() {
            ui.horizontal(|ui| {
                let active = self.labels.selected() == Some(label.name.as_str());
                if ui.selectable_label(active, &label.name).clicked() {
                    clicked = Some(label.name.clone());
                }
                if ui.small_button("✕").clicked() {
                    deleted = Some(label.name.clone());
                }
            });
        }
        if let Some(name) = clicked {
            // Clicking the active label again deselects it.
            if self.labels.selected() == Some(name.as_str()) {
                self.labels.deselect();
            } else {
                self.labels.select(&name);
            }
        }
        if let Some(name) = deleted {
            self.request_delete_label(&name);
        }
    }

    fn annotations_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Annotations");
        if self.annotations.is_empty() {
            ui.label("None yet.");
            return;
        }
        let mut selected = self.selected;
        let mut delete: Option<i64> = None;
        for (i, ann) in self.annotations.iter().enumerate() {
            ui.horizontal(|ui| {
                let text = format!(
                    "{}: ({:.3}, {:.3}) - ({:.3}, {:.3})",
                    ann.label, ann.rect.x1, ann.rect.y1, ann.rect.x2, ann.rect.y2
                );
                if ui.selectable_label(selected == Some(i), text).clicked() {
                    selected = Some(i);
                }
                if ui.small_button("✕").clicked() {
                    delete = Some(ann.id);
                }
            });
        }
        self.selected = selected;
        if let Some(id) = delete {
            self.store.delete_annotation(id);
        }
    }

    // ── Canvas ──────────────────────────────────────────────────────────

    fn canvas(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let Some(view) = self.view else {
            ui.centered_and_justified(|ui| {
                ui.spinner();
                ui.label("Loading image…");
            });
            return;
        };

        let (response, painter) =
            ui.allocate_painter(view.display_size(), egui::Sense::click_and_drag());
        let canvas_rect = response.rect;
        let origin = canvas_rect.min;

        painter.rect_filled(canvas_rect, 0.0, egui::Color32::from_gray(40));
        if let Some(ref tex) = self.texture {
            painter.image(
                tex.id(),
                canvas_rect,
                egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                egui::Color32::WHITE,
            );
        }

        // Hover detection runs only while idle; first containment match in
        // list order wins.
        let hover_uv = response.hover_pos().map(|p| view.to_uv(origin, p));
        if self.draw.is_drawing() {
            self.hovered = None;
        } else {
            self.hovered = hover_uv
                .and_then(|uv| self.annotations.iter().position(|a| a.rect.contains(uv)));
        }

        // Gesture handling.
        if response.drag_started_by(egui::PointerButton::Primary) {
            if let Some(uv) = hover_uv {
                match self.draw.begin(uv, self.labels.selected().is_some()) {
                    Ok(()) => {}
                    Err(DrawRefusal::NoLabelSelected) => {
                        self.notify(NoticeKind::Info, "Select a label first");
                    }
                    Err(DrawRefusal::GestureActive) => {}
                }
            }
        }
        if response.dragged_by(egui::PointerButton::Primary) && self.draw.is_drawing() {
            let pointer = ctx.input(|i| i.pointer.latest_pos());
            if let Some(p) = pointer {
                if canvas_rect.contains(p) {
                    self.draw.update(view.to_uv(origin, p));
                } else {
                    // Leaving the canvas finalizes with the last in-bounds
                    // point.
                    self.commit_gesture();
                }
            }
        }
        if response.drag_stopped_by(egui::PointerButton::Primary) && self.draw.is_drawing() {
            if let Some(p) = response.hover_pos() {
                self.draw.update(view.to_uv(origin, p));
            }
            self.commit_gesture();
        }

        // A plain click selects the hovered rectangle (or clears).
        if response.clicked() {
            self.selected = self.hovered;
        }

        // Committed rectangles with state-encoded border colors.
        for (i, ann) in self.annotations.iter().enumerate() {
            let color = if self.selected == Some(i) {
                COLOR_SELECTED
            } else if self.hovered == Some(i) {
                COLOR_HOVERED
            } else {
                COLOR_DEFAULT
            };
            let rect = view.rect_to_canvas(origin, &ann.rect);
            painter.rect_stroke(
                rect,
                0.0,
                egui::Stroke::new(2.0, color),
                egui::StrokeKind::Middle,
            );
            painter.text(
                rect.min - egui::vec2(0.0, 5.0),
                egui::Align2::LEFT_BOTTOM,
                &ann.label,
                egui::FontId::proportional(14.0),
                color,
            );
        }

        // Live preview of the gesture in progress.
        if let Some(preview) = self.draw.preview() {
            painter.rect_stroke(
                view.rect_to_canvas(origin, &preview),
                0.0,
                egui::Stroke::new(2.0, COLOR_DEFAULT),
                egui::StrokeKind::Middle,
            );
        }
    }

    fn notices_panel(&mut self, ui: &mut egui::Ui) {
        for notice in &self.notices {
            let color = match notice.kind {
                NoticeKind::Info => egui::Color32::from_rgb(220, 180, 0),
                NoticeKind::Error => egui::Color32::from_rgb(230, 60, 60),
            };
            ui.colored_label(color, &notice.text);
        }
    }
}

impl eframe::App for AnnotateApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Background results arrive outside egui's event stream; poll soon.
        ctx.request_repaint_after(Duration::from_millis(150));

        for event in self.store.poll() {
            self.apply_event(event);
        }
        let now = Instant::now();
        self.notices.retain(|n| n.expires > now);

        self.ensure_texture(ctx);

        if !ctx.wants_keyboard_input() {
            let delete = ctx.input(|i| {
                i.key_pressed(egui::Key::Delete) || i.key_pressed(egui::Key::Backspace)
            });
            if delete {
                self.request_delete_selected();
            }
        }

        egui::SidePanel::left("labels").min_width(180.0).show(ctx, |ui| {
            self.labels_panel(ui);
        });
        egui::SidePanel::right("annotations")
            .min_width(220.0)
            .show(ctx, |ui| {
                self.annotations_panel(ui);
            });
        if !self.notices.is_empty() {
            egui::TopBottomPanel::bottom("notices").show(ctx, |ui| {
                self.notices_panel(ui);
            });
        }
        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::both().show(ui, |ui| {
                self.canvas(ui, ctx);
            });
        });
    }
}
