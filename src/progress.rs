use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Init,
    Searching,
    Displaying,
}

/// Maps a fetch lifecycle phase to its advisory percentage and status line.
pub fn progress_for(phase: ProgressPhase) -> (u8, &'static str) {
    match phase {
        ProgressPhase::Init => (10, "Initializing search..."),
        ProgressPhase::Searching => (30, "Finding images..."),
        ProgressPhase::Displaying => (100, "Displaying results..."),
    }
}

/// Terminal rendering of [`progress_for`]. Drawing is fire-and-forget.
///
/// Clones share the same bar.
#[derive(Clone)]
pub struct ProgressIndicator {
    bar: ProgressBar,
}

impl ProgressIndicator {
    pub fn new() -> Self {
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} {bar:30.cyan/blue} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        let bar = ProgressBar::new(100);
        bar.set_style(style);
        Self { bar }
    }

    /// Indicator that draws nothing; for non-interactive output.
    pub fn hidden() -> Self {
        let bar = ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::hidden());
        Self { bar }
    }

    pub fn update(&self, phase: ProgressPhase) {
        let (percentage, status) = progress_for(phase);
        self.bar.set_position(u64::from(percentage));
        self.bar.set_message(status);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    pub fn is_finished(&self) -> bool {
        self.bar.is_finished()
    }
}

impl Default for ProgressIndicator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_map_to_fixed_percentages() {
        assert_eq!(progress_for(ProgressPhase::Init), (10, "Initializing search..."));
        assert_eq!(progress_for(ProgressPhase::Searching).0, 30);
        assert_eq!(progress_for(ProgressPhase::Displaying).0, 100);
    }

    #[test]
    fn hidden_indicator_tracks_position() {
        let indicator = ProgressIndicator::hidden();
        indicator.update(ProgressPhase::Searching);
        assert_eq!(indicator.position(), 30);
        indicator.update(ProgressPhase::Displaying);
        assert_eq!(indicator.position(), 100);
        assert!(!indicator.is_finished());
        indicator.finish();
        assert!(indicator.is_finished());
    }
}
