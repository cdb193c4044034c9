use std::path::PathBuf;

use eframe::egui::{self, ColorImage, TextureHandle, TextureOptions, ViewportBuilder, ViewportId};

use crate::app::SegmentationApp;
use crate::config::Config;
use crate::model::SamModelLoader;
use crate::traits::FolderPicker;
use crate::SegmentedFrame;

pub const MAIN_WINDOW_TITLE: &str = "SAM Segmentation App";
pub const FRAME_WINDOW_TITLE: &str = "Segmented Image";

/// Largest initial size of the frame window; bigger images are shrunk to fit.
const MAX_FRAME_WINDOW: f32 = 1600.0;

/// Native directory chooser.
#[derive(Debug, Default)]
pub struct RfdFolderPicker;

impl FolderPicker for RfdFolderPicker {
    fn pick_folder(&mut self) -> Option<PathBuf> {
        rfd::FileDialog::new().set_title("Select Folder").pick_folder()
    }
}

pub struct SamApp {
    controller: SegmentationApp<RfdFolderPicker, SamModelLoader>,
    texture: Option<TextureHandle>,
}

impl SamApp {
    pub fn new(config: &Config) -> Self {
        Self {
            controller: SegmentationApp::new(
                RfdFolderPicker,
                SamModelLoader::from_config(config),
                config.on_inference_error,
            ),
            texture: None,
        }
    }
}

impl eframe::App for SamApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.label(self.controller.label());
            let button = egui::Button::new("Select Folder");
            if ui.add_enabled(!self.controller.is_busy(), button).clicked() {
                self.controller.select_folder();
            }
        });

        if !self.controller.is_busy() {
            return;
        }

        // Inference for the next file runs right here, on the GUI thread.
        let Some(frame) = self.controller.advance() else {
            // the run ended; repaint so the new label shows up
            self.texture = None;
            ctx.request_repaint();
            return;
        };
        let texture = self
            .texture
            .get_or_insert_with(|| load_frame_texture(ctx, frame))
            .clone();

        if show_frame_window(ctx, &texture) {
            self.controller.dismiss();
            self.texture = None;
            ctx.request_repaint();
        }
    }
}

fn load_frame_texture(ctx: &egui::Context, frame: &SegmentedFrame) -> TextureHandle {
    let size = [frame.image.width() as usize, frame.image.height() as usize];
    let image = ColorImage::from_rgb(size, frame.image.as_raw());
    ctx.load_texture(
        frame.path.display().to_string(),
        image,
        TextureOptions::LINEAR,
    )
}

/// Shows the frame in its own window. Returns `true` once any key is pressed in
/// it or it is closed.
fn show_frame_window(ctx: &egui::Context, texture: &TextureHandle) -> bool {
    let [width, height] = texture.size().map(|v| v as f32);
    let scale = (MAX_FRAME_WINDOW / width.max(height)).min(1.0);

    ctx.show_viewport_immediate(
        ViewportId::from_hash_of(FRAME_WINDOW_TITLE),
        ViewportBuilder::default()
            .with_title(FRAME_WINDOW_TITLE)
            .with_inner_size([width * scale, height * scale]),
        |ctx, _class| {
            egui::CentralPanel::default()
                .frame(egui::Frame::none())
                .show(ctx, |ui| {
                    ui.centered_and_justified(|ui| {
                        ui.add(egui::Image::new(texture).shrink_to_fit());
                    });
                });

            ctx.input(|input| {
                input.viewport().close_requested()
                    || input
                        .events
                        .iter()
                        .any(|event| matches!(event, egui::Event::Key { pressed: true, .. }))
            })
        },
    )
}

/// Opens the main window and blocks until it is closed.
pub fn run(config: Config) -> eframe::Result {
    let options = eframe::NativeOptions {
        viewport: ViewportBuilder::default()
            .with_title(MAIN_WINDOW_TITLE)
            .with_position([100.0, 100.0])
            .with_inner_size([800.0, 600.0]),
        ..Default::default()
    };

    eframe::run_native(
        MAIN_WINDOW_TITLE,
        options,
        Box::new(move |_cc| Ok(Box::new(SamApp::new(&config)))),
    )
}
