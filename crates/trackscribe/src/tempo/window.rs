use crate::types::AnalysisWindow;

/// Tracks shorter than this carry too little signal for a tempo estimate.
pub const MIN_DURATION_SECS: f64 = 6.0;

/// Pick the part of the track used for tempo analysis.
///
/// Long tracks use a fixed mid-track region that avoids intros and outros,
/// medium tracks a centered window of 80% of the duration, short tracks the
/// whole file. Returns `None` below [`MIN_DURATION_SECS`].
pub fn select_window(duration: f64) -> Option<AnalysisWindow> {
    if !duration.is_finite() || duration < MIN_DURATION_SECS {
        return None;
    }

    if duration >= 32.0 {
        return Some(AnalysisWindow::new(20.0, 30.0));
    }

    if duration >= 12.0 {
        let length = (duration * 0.8).floor().clamp(8.0, 30.0);
        let start = ((duration - length) / 2.0).floor().max(0.0);
        return Some(AnalysisWindow::new(start, length));
    }

    Some(AnalysisWindow::new(0.0, duration.floor()))
}
