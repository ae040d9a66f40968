use crate::convert::{ConvertConfig, JsonToCsv};
use crate::error::PipelineError;
use crate::pipeline::sink::AtomicFileSink;
use crate::pipeline::source::{open_stream, FetchConfig};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Configuration for one fetch-and-convert run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub fetch: FetchConfig,
    pub convert: ConvertConfig,

    /// Destination CSV file; missing parent directories are created
    pub output_path: PathBuf,

    /// Number of CSV chunks that may wait between the transform and the sink
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            fetch: FetchConfig::default(),
            convert: ConvertConfig::default(),
            output_path: PathBuf::from("data").join("results.csv"),
            channel_capacity: 16,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.convert.validate()?;
        self.fetch.request_url()?;
        if self.channel_capacity == 0 {
            return Err(PipelineError::Config(
                "channel capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Summary of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub output_path: PathBuf,
    pub rows: usize,
    pub columns: usize,
    pub bytes_received: usize,
    pub bytes_written: u64,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

struct TransformSummary {
    rows: usize,
    columns: usize,
    bytes_received: usize,
}

/// Fetch the configured document and write it out as CSV
pub async fn run(config: &PipelineConfig) -> Result<RunReport, PipelineError> {
    let client = config.fetch.build_client()?;
    run_with_client(&client, config).await
}

/// Like [`run`], with a caller-supplied HTTP client
pub async fn run_with_client(
    client: &reqwest::Client,
    config: &PipelineConfig,
) -> Result<RunReport, PipelineError> {
    config.validate()?;
    let started = Instant::now();

    let sink = AtomicFileSink::create(&config.output_path).await?;
    let source = open_stream(client, &config.fetch).await?;

    drive(source, sink, &config.convert, config.channel_capacity, started).await
}

/// Convert an arbitrary byte stream into the given sink
///
/// The first error from any stage aborts the run. The sink is dropped
/// without persisting, so no partial output is left at its destination.
pub async fn convert_stream<S>(
    source: S,
    sink: AtomicFileSink,
    convert: &ConvertConfig,
    channel_capacity: usize,
) -> Result<RunReport, PipelineError>
where
    S: Stream<Item = Result<Bytes, PipelineError>> + Unpin,
{
    convert.validate()?;
    if channel_capacity == 0 {
        return Err(PipelineError::Config(
            "channel capacity must be at least 1".into(),
        ));
    }
    drive(source, sink, convert, channel_capacity, Instant::now()).await
}

async fn drive<S>(
    source: S,
    sink: AtomicFileSink,
    convert: &ConvertConfig,
    channel_capacity: usize,
    started: Instant,
) -> Result<RunReport, PipelineError>
where
    S: Stream<Item = Result<Bytes, PipelineError>> + Unpin,
{
    let (tx, rx) = mpsc::channel(channel_capacity);

    let (summary, (output_path, bytes_written)) = tokio::try_join!(
        transform_stage(source, convert.clone(), tx),
        sink_stage(sink, rx)
    )?;

    let report = RunReport {
        output_path,
        rows: summary.rows,
        columns: summary.columns,
        bytes_received: summary.bytes_received,
        bytes_written,
        elapsed: started.elapsed(),
    };
    info!(
        path = %report.output_path.display(),
        rows = report.rows,
        columns = report.columns,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Conversion complete"
    );
    Ok(report)
}

async fn transform_stage<S>(
    mut source: S,
    config: ConvertConfig,
    tx: mpsc::Sender<String>,
) -> Result<TransformSummary, PipelineError>
where
    S: Stream<Item = Result<Bytes, PipelineError>> + Unpin,
{
    let mut stage = JsonToCsv::new(config);
    while let Some(chunk) = source.next().await {
        stage.push(&chunk?);
    }
    let bytes_received = stage.buffered_len();
    debug!(bytes = bytes_received, chunks = stage.chunks_received(), "Source exhausted");

    let chunks = stage.finish()?;
    let summary = TransformSummary {
        rows: chunks.rows(),
        columns: chunks.columns(),
        bytes_received,
    };

    for chunk in chunks {
        tx.send(chunk?).await.map_err(|_| {
            PipelineError::sink(
                "output sink closed before conversion finished",
                std::io::Error::from(std::io::ErrorKind::BrokenPipe),
            )
        })?;
    }

    Ok(summary)
}

async fn sink_stage(
    mut sink: AtomicFileSink,
    mut rx: mpsc::Receiver<String>,
) -> Result<(PathBuf, u64), PipelineError> {
    while let Some(chunk) = rx.recv().await {
        sink.write_chunk(&chunk).await?;
    }
    let bytes_written = sink.bytes_written();
    let path = sink.finish().await?;
    Ok((path, bytes_written))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::source::tests::{serve_once, test_client};
    use futures_util::stream;
    use std::fs;
    use tempfile::TempDir;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Bytes, PipelineError>> + Unpin {
        let items: Vec<Result<Bytes, PipelineError>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect();
        stream::iter(items)
    }

    #[tokio::test]
    async fn test_convert_stream_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("data").join("results.csv");
        let sink = AtomicFileSink::create(&output).await.unwrap();

        let source = chunks(&[r#"{"results":[{"name":{"first":"An"#, r#"n"}},{"name":{"first":"Bo"}}]}"#]);
        let report = convert_stream(source, sink, &ConvertConfig::default(), 1)
            .await
            .unwrap();

        assert_eq!(fs::read_to_string(&output).unwrap(), "name.first\nAnn\nBo\n");
        assert_eq!(report.rows, 2);
        assert_eq!(report.columns, 1);
        assert_eq!(report.bytes_written, 18);
        assert_eq!(report.output_path, output);
    }

    #[tokio::test]
    async fn test_malformed_document_leaves_no_file() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("results.csv");
        let sink = AtomicFileSink::create(&output).await.unwrap();

        let source = chunks(&[r#"{"results":[{"a":1}"#]);
        let err = convert_stream(source, sink, &ConvertConfig::default(), 4)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::MalformedDocument(_)));
        assert!(!output.exists());
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_source_error_aborts_run() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("results.csv");
        let sink = AtomicFileSink::create(&output).await.unwrap();

        let items: Vec<Result<Bytes, PipelineError>> = vec![
            Ok(Bytes::from_static(br#"{"results":["#)),
            Err(PipelineError::Transport {
                context: "error reading response body".into(),
                source: None,
            }),
        ];
        let err = convert_stream(stream::iter(items), sink, &ConvertConfig::default(), 4)
            .await
            .unwrap_err();

        assert_eq!(err.stage(), crate::error::PipelineStage::Source);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_empty_results_write_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("results.csv");
        let sink = AtomicFileSink::create(&output).await.unwrap();

        let report = convert_stream(chunks(&[r#"{"results":[]}"#]), sink, &ConvertConfig::default(), 4)
            .await
            .unwrap();

        assert_eq!(report.rows, 0);
        assert_eq!(fs::read_to_string(&output).unwrap(), "");
    }

    #[tokio::test]
    async fn test_many_rows_through_small_channel() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("results.csv");
        let sink = AtomicFileSink::create(&output).await.unwrap();

        let records: Vec<String> = (0..500).map(|i| format!(r#"{{"id":{},"user":{{"n":"u{}"}}}}"#, i, i)).collect();
        let doc = format!(r#"{{"results":[{}]}}"#, records.join(","));
        let (head, tail) = doc.split_at(doc.len() / 3);

        let report = convert_stream(chunks(&[head, tail]), sink, &ConvertConfig::default(), 2)
            .await
            .unwrap();

        let written = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(report.rows, 500);
        assert_eq!(lines.len(), 501);
        assert_eq!(lines[0], "id,user.n");
        assert_eq!(lines[1], "0,u0");
        assert_eq!(lines[500], "499,u499");
    }

    #[tokio::test]
    async fn test_zero_capacity_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let sink = AtomicFileSink::create(temp_dir.path().join("out.csv")).await.unwrap();

        let err = convert_stream(chunks(&["{}"]), sink, &ConvertConfig::default(), 0)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[tokio::test]
    async fn test_run_over_http() {
        let base_url = serve_once(
            "200 OK",
            vec![r#"{"results":[{"gender":"female","name":{"first":"Ann"}},"#, r#"{"name":{"first":"Bo"},"tags":[1,2]}]}"#],
        )
        .await;
        let temp_dir = TempDir::new().unwrap();
        let config = PipelineConfig {
            fetch: FetchConfig {
                base_url,
                result_count: 2,
                ..FetchConfig::default()
            },
            output_path: temp_dir.path().join("data").join("results.csv"),
            ..PipelineConfig::default()
        };

        let report = run_with_client(&test_client(), &config).await.unwrap();

        assert_eq!(
            fs::read_to_string(&config.output_path).unwrap(),
            "gender,name.first,tags\nfemale,Ann,\n,Bo,1,2\n"
        );
        assert_eq!(report.rows, 2);
        assert_eq!(report.columns, 3);
    }

    #[tokio::test]
    async fn test_run_http_error_leaves_no_file() {
        let base_url = serve_once("500 Internal Server Error", vec!["oops"]).await;
        let temp_dir = TempDir::new().unwrap();
        let config = PipelineConfig {
            fetch: FetchConfig {
                base_url,
                ..FetchConfig::default()
            },
            output_path: temp_dir.path().join("results.csv"),
            ..PipelineConfig::default()
        };

        let err = run_with_client(&test_client(), &config).await.unwrap_err();

        assert_eq!(err.stage(), crate::error::PipelineStage::Source);
        assert!(!config.output_path.exists());
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_sink_failure_aborts_run() {
        let temp_dir = TempDir::new().unwrap();
        // A non-empty directory at the destination makes the final rename fail
        let output = temp_dir.path().join("results.csv");
        fs::create_dir(&output).unwrap();
        fs::write(output.join("keep"), "x").unwrap();
        let sink = AtomicFileSink::create(&output).await.unwrap();

        let records: Vec<String> = (0..200).map(|i| format!(r#"{{"id":{}}}"#, i)).collect();
        let doc = format!(r#"{{"results":[{}]}}"#, records.join(","));
        let err = convert_stream(chunks(&[&doc]), sink, &ConvertConfig::default(), 1)
            .await
            .unwrap_err();

        assert_eq!(err.stage(), crate::error::PipelineStage::Sink);
        assert!(output.is_dir());
        let leftovers: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("results.csv")]);
    }

    #[tokio::test]
    async fn test_closed_sink_stops_transform() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let err = transform_stage(
            chunks(&[r#"{"results":[{"a":1},{"a":2}]}"#]),
            ConvertConfig::default(),
            tx,
        )
        .await
        .err()
        .expect("send into a closed channel must fail");

        assert_eq!(err.stage(), crate::error::PipelineStage::Sink);
    }

    #[test]
    fn test_report_serializes_elapsed_millis() {
        let report = RunReport {
            output_path: PathBuf::from("data/results.csv"),
            rows: 2,
            columns: 3,
            bytes_received: 64,
            bytes_written: 18,
            elapsed: Duration::from_micros(1_500_900),
        };

        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["elapsed_ms"], serde_json::json!(1500));
        assert_eq!(json["rows"], serde_json::json!(2));
        assert!(json.get("elapsed").is_none());
    }

    #[test]
    fn test_config_validation() {
        assert!(PipelineConfig::default().validate().is_ok());

        let bad_capacity = PipelineConfig {
            channel_capacity: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(bad_capacity.validate(), Err(PipelineError::Config(_))));
    }
}
