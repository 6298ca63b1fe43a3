use common::status::StreamStatsView;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use telemetry::metrics::{TX_BYTES, TX_FRAMES};

/// Frame arrivals kept for the actual-framerate estimate.
const RECENT_FRAMES: usize = 120;

/// No frame for this long and the stream counts as stalled.
const STALL_AFTER: Duration = Duration::from_secs(2);

#[derive(Debug)]
struct Counters {
    total_bytes: u64,
    frame_count: u64,
    started: Instant,
    recent: VecDeque<Instant>,
}

impl Counters {
    fn fresh() -> Self {
        Self {
            total_bytes: 0,
            frame_count: 0,
            started: Instant::now(),
            recent: VecDeque::with_capacity(RECENT_FRAMES),
        }
    }
}

/// Cumulative transmission counters, written from the streaming thread.
#[derive(Debug)]
pub struct StatsRegister {
    inner: RwLock<Counters>,
}

impl Default for StatsRegister {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsRegister {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Counters::fresh()),
        }
    }

    /// Count one outgoing frame. Returns the frame count after recording.
    pub fn record_frame(&self, bytes: usize) -> u64 {
        let now = Instant::now();
        let count = {
            let mut c = self.inner.write();
            c.total_bytes = c.total_bytes.saturating_add(bytes as u64);
            c.frame_count += 1;
            if c.recent.len() == RECENT_FRAMES {
                c.recent.pop_front();
            }
            c.recent.push_back(now);
            c.frame_count
        };
        TX_FRAMES.inc();
        TX_BYTES.inc_by(bytes as u64);
        count
    }

    pub fn reset(&self) {
        *self.inner.write() = Counters::fresh();
    }

    pub fn frame_count(&self) -> u64 {
        self.inner.read().frame_count
    }

    pub fn snapshot(&self, target_framerate: u32) -> StreamStatsView {
        let c = self.inner.read();
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(c.started).as_secs_f64();

        let current_bitrate_kbps = if elapsed > 0.0 {
            (c.total_bytes as f64 * 8.0) / (elapsed * 1000.0)
        } else {
            0.0
        };

        let actual_framerate = actual_framerate(&c.recent, now);
        let efficiency_percent = match actual_framerate {
            Some(fps) if target_framerate > 0 => {
                Some((fps / f64::from(target_framerate) * 100.0).clamp(0.0, 100.0))
            }
            _ => None,
        };

        StreamStatsView {
            total_bytes: c.total_bytes,
            frame_count: c.frame_count,
            current_bitrate_kbps,
            elapsed_secs: elapsed,
            actual_framerate,
            target_framerate,
            efficiency_percent,
        }
    }
}

fn actual_framerate(recent: &VecDeque<Instant>, now: Instant) -> Option<f64> {
    let (first, last) = (recent.front()?, recent.back()?);
    if recent.len() < 2 {
        return None;
    }
    if now.saturating_duration_since(*last) > STALL_AFTER {
        return Some(0.0);
    }
    let span = last.saturating_duration_since(*first).as_secs_f64();
    if span <= 0.0 {
        return None;
    }
    Some((recent.len() - 1) as f64 / span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn counters_accumulate() {
        let stats = StatsRegister::new();
        assert_eq!(stats.record_frame(1000), 1);
        assert_eq!(stats.record_frame(500), 2);
        let view = stats.snapshot(30);
        assert_eq!(view.total_bytes, 1500);
        assert_eq!(view.frame_count, 2);
        assert_eq!(view.target_framerate, 30);
        assert!(view.current_bitrate_kbps > 0.0);
    }

    #[test]
    fn reset_clears_everything() {
        let stats = StatsRegister::new();
        stats.record_frame(4096);
        stats.reset();
        let view = stats.snapshot(30);
        assert_eq!(view.total_bytes, 0);
        assert_eq!(view.frame_count, 0);
        assert_eq!(view.actual_framerate, None);
        assert_eq!(view.efficiency_percent, None);
    }

    #[test]
    fn framerate_needs_two_samples() {
        let stats = StatsRegister::new();
        stats.record_frame(10);
        assert_eq!(stats.snapshot(30).actual_framerate, None);
    }

    #[test]
    fn efficiency_is_clamped() {
        let stats = StatsRegister::new();
        for _ in 0..5 {
            stats.record_frame(10);
            thread::sleep(Duration::from_millis(5));
        }
        let view = stats.snapshot(1);
        let fps = view.actual_framerate.unwrap();
        assert!(fps > 1.0);
        assert_eq!(view.efficiency_percent, Some(100.0));
    }

    #[test]
    fn window_is_bounded() {
        let stats = StatsRegister::new();
        for _ in 0..(RECENT_FRAMES * 2) {
            stats.record_frame(1);
        }
        assert_eq!(stats.inner.read().recent.len(), RECENT_FRAMES);
        assert_eq!(stats.frame_count(), (RECENT_FRAMES * 2) as u64);
    }
}
