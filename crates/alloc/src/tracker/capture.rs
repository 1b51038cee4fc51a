//! Pluggable call-stack capture
//!
//! Only raw instruction pointers are stored; symbolication is left to
//! external tooling.

/// Source of call stacks for tracked allocations
pub trait CallStackCapturer: Send + Sync {
    /// Captures at most `max_depth` return addresses, innermost first
    fn capture(&self, max_depth: usize) -> Vec<usize>;
}

impl<F> CallStackCapturer for F
where
    F: Fn(usize) -> Vec<usize> + Send + Sync,
{
    fn capture(&self, max_depth: usize) -> Vec<usize> {
        self(max_depth)
    }
}

/// Capturer backed by the `backtrace` crate
#[cfg(feature = "profiling")]
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktraceCapturer {
    /// Innermost frames dropped before recording
    pub skip: usize,
}

#[cfg(feature = "profiling")]
impl BacktraceCapturer {
    /// Skips the frames inside the tracker itself
    pub fn new() -> Self {
        Self { skip: 4 }
    }
}

#[cfg(feature = "profiling")]
impl CallStackCapturer for BacktraceCapturer {
    fn capture(&self, max_depth: usize) -> Vec<usize> {
        let mut frames = Vec::with_capacity(max_depth);
        let mut skipped = 0;
        backtrace::trace(|frame| {
            if skipped < self.skip {
                skipped += 1;
                return true;
            }
            frames.push(frame.ip() as usize);
            frames.len() < max_depth
        });
        frames
    }
}

/// Formats return addresses one per line
pub fn format_call_stack(frames: &[usize]) -> String {
    frames
        .iter()
        .enumerate()
        .map(|(depth, ip)| format!("  #{depth:<2} {ip:#018x}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_capturer() {
        let capturer = |depth: usize| (0..depth).map(|i| 0x1000 + i).collect::<Vec<_>>();
        let frames = capturer.capture(3);
        assert_eq!(frames, vec![0x1000, 0x1001, 0x1002]);
        assert!(format_call_stack(&frames).contains("#1"));
    }

    #[cfg(feature = "profiling")]
    #[test]
    fn test_backtrace_capturer_respects_depth() {
        let frames = BacktraceCapturer::default().capture(4);
        assert!(frames.len() <= 4);
    }
}
