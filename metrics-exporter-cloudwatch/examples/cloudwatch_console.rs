use std::time::{Duration, SystemTime};

use metrics_exporter_cloudwatch::{
    CloudWatchBuilder, Datum, DatumPayload, Distribution, MeasurementPoint, MetricDecoration, MetricsClient, PutFuture,
};
use rand::Rng;

/// Client that prints every batch to standard output instead of sending it anywhere.
struct ConsoleClient;

impl MetricsClient for ConsoleClient {
    fn put_batch<'a>(&'a self, namespace: &'a str, datums: &'a [Datum]) -> PutFuture<'a> {
        Box::pin(async move {
            println!("PutBatch namespace={namespace} datums={}", datums.len());
            for datum in datums {
                let dimensions = datum
                    .dimensions()
                    .iter()
                    .map(|d| format!("{}={}", d.name(), d.value()))
                    .collect::<Vec<_>>()
                    .join(",");
                match datum.payload() {
                    DatumPayload::Value(value) => {
                        println!("  {} [{dimensions}] value={value}", datum.metric_name());
                    }
                    DatumPayload::StatisticSet(set) => println!(
                        "  {} [{dimensions}] values={} count={} sum={:.3} min={:.3} max={:.3} unit={:?}",
                        datum.metric_name(),
                        set.values.len(),
                        set.sample_count,
                        set.sum,
                        set.minimum,
                        set.maximum,
                        datum.unit(),
                    ),
                }
            }
            Ok(())
        })
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let (points, exporter) = CloudWatchBuilder::default()
        .with_namespace("ConsoleDemo")
        .with_force_flush_interval(Duration::from_secs(5))
        .with_rollup_dimensions([vec!["service"], vec![]])
        .add_decoration(MetricDecoration::new("cpu", "usage_idle").with_unit("Percent"))
        .add_decoration(MetricDecoration::new("http", "latency").with_rename("RequestLatency"))
        .build(ConsoleClient)
        .expect("failed to build CloudWatch exporter");

    let mut rng = rand::rng();

    // Pretend to be an aggregator, delivering a handful of points every second.
    for _ in 0..20 {
        let cpu = MeasurementPoint::new("cpu", SystemTime::now())
            .with_tag("host", "demo-host")
            .with_tag("service", "console")
            .with_field("usage_idle", rng.random_range(0.0..100.0));

        let mut latency = Distribution::new("Milliseconds");
        for _ in 0..rng.random_range(1..400) {
            latency.add_entry(rng.random_range(0.0..250.0_f64).round(), 1.0);
        }
        let http = MeasurementPoint::new("http", SystemTime::now())
            .with_tag("host", "demo-host")
            .with_tag("service", "console")
            .with_field("latency", latency)
            .with_field("requests", rng.random_range(0..1000i64));

        for point in [cpu, http] {
            points.send(point).await.expect("exporter stopped");
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    drop(points);
    exporter.close().await;
}
