//! An exporter that batches measurement points and publishes them to a [CloudWatch][cw]-style metrics API.
//!
//! [cw]: https://docs.aws.amazon.com/AmazonCloudWatch/latest/APIReference/API_PutMetricData.html
//!
//! # Usage
//!
//! The exporter is driven by a channel of [`MeasurementPoint`]s, produced by whatever upstream stage aggregates raw
//! measurements, and publishes through a [`MetricsClient`] that wraps the remote API:
//!
//! ```no_run
//! # use std::time::SystemTime;
//! # use metrics_exporter_cloudwatch::{CloudWatchBuilder, Datum, MeasurementPoint, MetricsClient, PutFuture};
//! # struct MyClient;
//! # impl MetricsClient for MyClient {
//! #     fn put_batch<'a>(&'a self, _: &'a str, _: &'a [Datum]) -> PutFuture<'a> { Box::pin(async { Ok(()) }) }
//! # }
//! # async fn run() {
//! // First, create a builder.
//! //
//! // The builder can configure many aspects of the exporter, such as the namespace to publish into, rollup
//! // dimensions, how many datums go into a single call, and how hard to retry.
//! let builder = CloudWatchBuilder::default()
//!     .with_namespace("MyApplication")
//!     .with_rollup_dimensions([["az"]]);
//!
//! // Building spawns the exporter's tasks onto the current Tokio runtime, and hands back the sender for measurement
//! // points along with a handle to the exporter itself.
//! let (points, exporter) = builder.build(MyClient).expect("failed to build exporter");
//!
//! let point = MeasurementPoint::new("cpu", SystemTime::now())
//!     .with_tag("host", "web-1")
//!     .with_tag("az", "us-east-1a")
//!     .with_field("usage_idle", 42.5);
//! points.send(point).await.expect("exporter stopped");
//!
//! // When done, close the exporter, which waits a short while for queued data to be published.
//! exporter.close().await;
//! # }
//! ```
//!
//! # Features
//!
//! ## Rollups
//!
//! Every field of a point is published once with the full set of dimensions derived from the point's tags, and once
//! more for every configured rollup rule whose tag keys are all present on the point.
//!
//! ## Distribution splitting
//!
//! Distributions are published as statistic sets. A distribution holding more distinct values than a single datum may
//! carry is split over several datums, each of which reports the minimum, maximum, sum and sample count of the whole
//! distribution.
//!
//! ## Batching and jittered publishing
//!
//! Datums are accumulated into batches bounded by both datum count and estimated request size. Batches are published
//! on a fixed interval whose phase is randomly jittered, so that many agents started at the same time do not all call
//! the remote API in the same second. When the queue of completed batches fills up, it is published immediately.
//!
//! ## Bounded publishing with backoff
//!
//! A fixed pool of workers publishes batches, so the number of concurrent calls to the remote API is bounded. Failed
//! calls are retried with exponential backoff that escalates across all workers. When the exporter falls too far
//! behind, batches are dropped rather than queued without bound.
//!
//! ## Telemetry
//!
//! The exporter captures its own internal telemetry around the number of datums built, batches flushed, and batches
//! published, retried or dropped. This telemetry is reported through the globally installed `metrics` recorder, under
//! the `cloudwatch.exporter` namespace.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod batch;
pub use self::batch::{DatumBatch, PAYLOAD_CEILING};

mod builder;
pub use self::builder::{BuildError, CloudWatchBuilder, CloudWatchExporter, Pending};

mod client;
pub use self::client::{ErrorCode, MetricsClient, PutError, PutFuture};

mod convert;
pub use self::convert::{DatumBuilder, HIGH_RESOLUTION_TAG_KEY};

mod datum;
pub use self::datum::{request_overhead, Datum, DatumPayload, StatisticSet};

mod decoration;
pub use self::decoration::{is_standard_unit, MetricDecoration, MetricDecorations, UnsupportedUnit};

mod dimensions;
pub use self::dimensions::{build_dimensions, Dimension, DimensionSet, RollupRules, MAX_DIMENSIONS};

mod distribution;
pub use self::distribution::{Distribution, DistributionChunk, Split};

mod forwarder;

mod point;
pub use self::point::{FieldValue, MeasurementPoint};

mod publisher;

mod retry;
pub use self::retry::ErrorClass;

mod telemetry;

#[cfg(test)]
mod test_util;
