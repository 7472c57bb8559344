//! Bucketed score counts for sorted queues.

use crate::{
    config::{GraphDefaults, GraphOverride},
    types::{GraphWindow, QueueFlags},
};

/// Window a sorted queue is graphed over, or `None` when its override is empty.
///
/// Fields missing from an override fall back to the queue kind's default:
/// `[now - span, now + span]` for timed queues, `[sorted_start, sorted_stop]` otherwise.
pub fn resolve_window(
    graph: Option<&GraphOverride>,
    flags: QueueFlags,
    defaults: &GraphDefaults,
    now: f64,
) -> Option<GraphWindow> {
    let base = if flags.is_timed {
        GraphWindow {
            start: now - defaults.timed_span_secs,
            stop: now + defaults.timed_span_secs,
            slices: defaults.slices,
        }
    } else {
        GraphWindow {
            start: defaults.sorted_start,
            stop: defaults.sorted_stop,
            slices: defaults.slices,
        }
    };

    match graph {
        None => Some(base),
        Some(graph) if graph.is_empty() => None,
        Some(graph) => Some(GraphWindow {
            start: graph.start.unwrap_or(base.start),
            stop: graph.stop.unwrap_or(base.stop),
            slices: graph.slices.unwrap_or(base.slices),
        }),
    }
}

/// Counts `scores` into `window.slices` equal-width buckets.
///
/// Bucket `i` is `[start + i*w, start + (i+1)*w)`; the last bucket also takes
/// scores equal to `stop`. Scores outside the window are ignored. A window
/// with `start >= stop` gives all-zero buckets.
pub fn generate(scores: impl IntoIterator<Item = f64>, window: &GraphWindow) -> Vec<u64> {
    let GraphWindow { start, stop, slices } = *window;
    let mut buckets = vec![0u64; slices];
    if slices == 0 || !(stop > start) {
        return buckets;
    }

    let width = (stop - start) / slices as f64;
    let boundary = |i: usize| start + width * i as f64;

    for score in scores {
        if !(score >= start && score <= stop) {
            continue;
        }

        let mut bucket = (((score - start) / width).floor() as usize).min(slices - 1);
        // float division can land one bucket off near a boundary
        while bucket + 1 < slices && score >= boundary(bucket + 1) {
            bucket += 1;
        }
        while bucket > 0 && score < boundary(bucket) {
            bucket -= 1;
        }

        buckets[bucket] += 1;
    }

    buckets
}
