use std::path::PathBuf;

use log::{debug, error, info};

use crate::batch::{BatchRun, StepOutcome};
use crate::config::ErrorPolicy;
use crate::traits::{FolderPicker, ModelLoader};
use crate::SegmentedFrame;

pub const INITIAL_LABEL: &str = "Select a folder to process images";
pub const COMPLETE_LABEL: &str = "Processing complete!";

/// Toolkit independent state of the main window.
///
/// Owns the instruction label, the folder picker, the model loader and the run
/// in progress. The GUI shell only forwards button clicks and dismissals and
/// renders [`SegmentationApp::frame`].
pub struct SegmentationApp<P: FolderPicker, L: ModelLoader> {
    picker: P,
    loader: L,
    policy: ErrorPolicy,
    label: String,
    run: Option<BatchRun<L::Model>>,
    frame: Option<SegmentedFrame>,
    completed_runs: usize,
}

impl<P: FolderPicker, L: ModelLoader> SegmentationApp<P, L> {
    pub fn new(picker: P, loader: L, policy: ErrorPolicy) -> Self {
        Self {
            picker,
            loader,
            policy,
            label: INITIAL_LABEL.to_string(),
            run: None,
            frame: None,
            completed_runs: 0,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn frame(&self) -> Option<&SegmentedFrame> {
        self.frame.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.run.is_some()
    }

    /// Runs that reached their last file.
    pub fn completed_runs(&self) -> usize {
        self.completed_runs
    }

    /// Opens the folder dialog and starts a run on the chosen folder.
    pub fn select_folder(&mut self) {
        if self.is_busy() {
            return;
        }
        match self.picker.pick_folder() {
            Some(folder) => self.start(folder),
            None => debug!("Folder selection cancelled"),
        }
    }

    /// Loads the model and starts processing `folder`.
    pub fn start(&mut self, folder: PathBuf) {
        if self.is_busy() {
            return;
        }
        info!("Processing images under {}", folder.display());
        match self.loader.load() {
            Ok(model) => self.run = Some(BatchRun::new(&folder, model, self.policy)),
            Err(err) => {
                error!("Failed to load model: {err}");
                self.label = format!("Failed to load model: {err}");
            }
        }
    }

    /// Moves the run forward until a frame is on screen or the run ends.
    pub fn advance(&mut self) -> Option<&SegmentedFrame> {
        while let Some(run) = self.run.as_mut() {
            match run.step() {
                StepOutcome::Display(frame) => {
                    self.frame = Some(frame);
                    break;
                }
                StepOutcome::Waiting => break,
                StepOutcome::Skipped(_) | StepOutcome::Failed { .. } => {}
                StepOutcome::Finished(_) => {
                    self.completed_runs += 1;
                    self.label = COMPLETE_LABEL.to_string();
                    self.run = None;
                }
                StepOutcome::Aborted { error, .. } => {
                    self.label = format!("Processing aborted: {error}");
                    self.run = None;
                }
                StepOutcome::Idle => self.run = None,
            }
        }
        self.frame.as_ref()
    }

    /// Closes the frame on screen; the next [`advance`](Self::advance) picks
    /// up the following file.
    pub fn dismiss(&mut self) {
        if self.frame.take().is_some() {
            if let Some(run) = self.run.as_mut() {
                run.dismiss();
            }
        }
    }
}
