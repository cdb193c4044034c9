use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::config::ErrorPolicy;
use crate::errors::SamSegError;
use crate::traits::MaskGenerator;
use crate::walker::BatchWalker;
use crate::{ImageSegmenter, SegmentedFrame};

/// Counts reported when a run finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub displayed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Result of advancing a run by one step.
#[derive(Debug)]
pub enum StepOutcome {
    /// A frame is ready; the run waits until it is dismissed.
    Display(SegmentedFrame),
    /// The file could not be read.
    Skipped(PathBuf),
    /// Mask generation failed and the run continues.
    Failed { path: PathBuf, error: SamSegError },
    /// Mask generation failed and the run is over.
    Aborted { path: PathBuf, error: SamSegError },
    /// The previous frame has not been dismissed yet.
    Waiting,
    /// The last file was handled. Reported once.
    Finished(BatchSummary),
    /// The run already ended.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Processing,
    AwaitingDismiss,
    Done,
}

/// One pass over a folder with a model handle loaded for this pass only.
///
/// Files are processed strictly one after another; after each displayed frame
/// the run stays put until [`BatchRun::dismiss`] is called.
pub struct BatchRun<M: MaskGenerator> {
    root: PathBuf,
    files: BatchWalker,
    segmenter: ImageSegmenter<M>,
    policy: ErrorPolicy,
    state: RunState,
    summary: BatchSummary,
}

impl<M: MaskGenerator> BatchRun<M> {
    pub fn new(root: &Path, model: M, policy: ErrorPolicy) -> Self {
        Self {
            root: root.to_path_buf(),
            files: BatchWalker::new(root),
            segmenter: ImageSegmenter::new(model),
            policy,
            state: RunState::Processing,
            summary: BatchSummary::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn summary(&self) -> BatchSummary {
        self.summary
    }

    pub fn is_finished(&self) -> bool {
        self.state == RunState::Done
    }

    /// Handles at most one file.
    pub fn step(&mut self) -> StepOutcome {
        match self.state {
            RunState::AwaitingDismiss => return StepOutcome::Waiting,
            RunState::Done => return StepOutcome::Idle,
            RunState::Processing => {}
        }

        let Some(path) = self.files.next() else {
            self.state = RunState::Done;
            info!(
                "Finished {}: {} displayed, {} unreadable, {} failed",
                self.root.display(),
                self.summary.displayed,
                self.summary.skipped,
                self.summary.failed
            );
            return StepOutcome::Finished(self.summary);
        };

        match self.segmenter.segment(&path) {
            Ok(Some(frame)) => {
                self.summary.displayed += 1;
                self.state = RunState::AwaitingDismiss;
                StepOutcome::Display(frame)
            }
            Ok(None) => {
                self.summary.skipped += 1;
                StepOutcome::Skipped(path)
            }
            Err(error) => match self.policy {
                ErrorPolicy::Skip => {
                    warn!("Skipping {}: {error}", path.display());
                    self.summary.failed += 1;
                    StepOutcome::Failed { path, error }
                }
                ErrorPolicy::Abort => {
                    error!("Aborting batch at {}: {error}", path.display());
                    self.summary.failed += 1;
                    self.state = RunState::Done;
                    StepOutcome::Aborted { path, error }
                }
            },
        }
    }

    /// Closes the displayed frame so the next file can be processed.
    pub fn dismiss(&mut self) {
        if self.state == RunState::AwaitingDismiss {
            self.state = RunState::Processing;
        }
    }
}
