//! Downsampling stage for range queries
//!
//! Greedy decimation: a sample is kept if at least one interval has passed
//! since the previously kept sample, where `interval = (to - from) / points`.
//! This is not aggregation. The number of emitted samples follows the
//! density of the data and is only roughly `points`.

use chrono::{DateTime, Utc};
use tracing::trace;

use super::backend::{Sample, SampleStream};
use super::codec::timestamp_nanos;

/// Decision state of the decimation
#[derive(Debug, Clone)]
pub struct Reducer {
    interval: i64,
    last_emitted: i64,
}

impl Reducer {
    /// Returns `None` when `points` is not positive, meaning no reduction.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>, points: i64) -> Option<Self> {
        if points <= 0 {
            return None;
        }
        let span = timestamp_nanos(&to).saturating_sub(timestamp_nanos(&from));
        Some(Self {
            interval: span / points,
            // the epoch stands in for "before any sample"
            last_emitted: 0,
        })
    }

    pub fn interval(&self) -> i64 {
        self.interval
    }

    /// Whether `sample` should be emitted. Updates the state if it is.
    pub fn admit(&mut self, sample: &Sample) -> bool {
        let ts = timestamp_nanos(&sample.timestamp);
        if ts.saturating_sub(self.last_emitted) >= self.interval {
            self.last_emitted = ts;
            true
        } else {
            false
        }
    }
}

/// Put a reducer stage in front of `input`.
///
/// With `points <= 0` the input is handed back untouched. Otherwise the
/// reduction runs on its own task behind another bounded buffer; dropping
/// the returned stream stops that task, which in turn drops `input`.
pub fn reduce_stream(
    mut input: SampleStream,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    points: i64,
) -> SampleStream {
    let Some(mut reducer) = Reducer::new(from, to, points) else {
        return input;
    };
    trace!("reducing range to ~{points} points, interval {}ns", reducer.interval());

    let (tx, output) = SampleStream::channel();
    tokio::spawn(async move {
        loop {
            // a dropped consumer has to stop the scan even while every
            // incoming sample is being discarded
            let sample = tokio::select! {
                biased;
                _ = tx.closed() => break,
                sample = input.next() => match sample {
                    Some(sample) => sample,
                    None => break,
                },
            };
            if reducer.admit(&sample) && tx.send(sample).await.is_err() {
                break;
            }
        }
        trace!("reducer stage finished");
    });
    output
}
