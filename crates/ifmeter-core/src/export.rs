// ── Record export ──
//
// Delimited charging and trace records built from ready sources after
// a counter cycle. Rendering is pure; delivery goes through an
// `ExportSink` so the scheduler does not care where records end up.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use strum::{Display, EnumString};
use tracing::{debug, info};

use crate::config::ExportFormat;
use crate::error::CoreError;
use crate::model::{Interface, Source};
use crate::store::Registry;

/// Which export stream a batch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExportKind {
    Charging,
    Trace,
}

/// Rendered records of one kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportBatch {
    pub body: String,
    pub records: usize,
}

impl ExportBatch {
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }
}

// ── Row rendering ───────────────────────────────────────────────────

/// Accumulates one delimited row.
struct Row<'a> {
    line: String,
    format: &'a ExportFormat,
}

impl<'a> Row<'a> {
    fn new(format: &'a ExportFormat) -> Self {
        Self {
            line: String::new(),
            format,
        }
    }

    fn push(&mut self, field: impl std::fmt::Display) -> &mut Self {
        if !self.line.is_empty() {
            self.line.push(self.format.separator);
        }
        let _ = write!(self.line, "{field}");
        self
    }

    /// Free text with the separator replaced so it cannot split the field.
    fn push_text(&mut self, text: Option<&str>) -> &mut Self {
        let sep = self.format.separator;
        let clean: String = text
            .unwrap_or_default()
            .chars()
            .map(|c| if c == sep || c == '\n' { '.' } else { c })
            .collect();
        self.push(clean)
    }

    fn push_time(&mut self, time: Option<DateTime<Utc>>) -> &mut Self {
        let rendered = time.map(|t| format_timestamp(t, &self.format.timestamp_format));
        self.push(rendered.unwrap_or_default())
    }

    fn finish(self, out: &mut String) {
        out.push_str(&self.line);
        out.push('\n');
    }
}

/// Render `time` with a strftime pattern, falling back to RFC 3339 if
/// the pattern is invalid.
pub fn format_timestamp(time: DateTime<Utc>, pattern: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", time.format(pattern)).is_err() {
        return time.to_rfc3339();
    }
    out
}

/// Append a charging row for every billable interface of `source`.
pub fn charging_rows(source: &Source, format: &ExportFormat, out: &mut String) -> usize {
    let mut records = 0;
    for iface in source.interfaces().filter(|i| i.is_billable()) {
        let mut row = Row::new(format);
        for value in source.tags.values() {
            row.push_text(Some(value));
        }
        push_identity(&mut row, source, iface);
        for value in iface.tags.values() {
            row.push_text(Some(value));
        }
        let (in_octets, out_octets) = iface.charged_octets();
        row.push(in_octets)
            .push(out_octets)
            .push_time(source.poll_time)
            .push(source.poll_duration)
            .push(u8::from(iface.is_up()));
        row.finish(out);
        records += 1;
    }
    records
}

/// Append a trace row for every trace-flagged interface of `source`.
pub fn trace_rows(source: &Source, format: &ExportFormat, out: &mut String) -> usize {
    let mut records = 0;
    for iface in source.interfaces().filter(|i| i.trace()) {
        let mut row = Row::new(format);
        row.push_time(source.poll_time);
        push_identity(&mut row, source, iface);
        row.push(iface.admin_status())
            .push(iface.oper_status())
            .push(iface.in_octets())
            .push(iface.out_octets())
            .push(source.sys_uptime);
        row.finish(out);
        records += 1;
    }
    records
}

fn push_identity(row: &mut Row<'_>, source: &Source, iface: &Interface) {
    row.push(source.ip())
        .push(iface.if_index)
        .push_text(Some(iface.descr()))
        .push_text(iface.if_name.as_deref())
        .push_text(iface.if_alias.as_deref());
}

/// Charging records over every ready source, ordered by IP.
pub async fn charging_records(registry: &Registry, format: &ExportFormat) -> ExportBatch {
    collect(registry, format, charging_rows).await
}

/// Trace records over every ready source, ordered by IP.
pub async fn trace_records(registry: &Registry, format: &ExportFormat) -> ExportBatch {
    collect(registry, format, trace_rows).await
}

async fn collect(
    registry: &Registry,
    format: &ExportFormat,
    render: fn(&Source, &ExportFormat, &mut String) -> usize,
) -> ExportBatch {
    let mut batch = ExportBatch::default();
    for handle in registry.ready().await {
        let source = handle.read().await;
        batch.records += render(&source, format, &mut batch.body);
    }
    batch
}

// ── Sinks ───────────────────────────────────────────────────────────

/// Destination for rendered export batches.
#[async_trait]
pub trait ExportSink: Send + Sync {
    async fn deliver(
        &self,
        kind: ExportKind,
        batch: &ExportBatch,
        at: DateTime<Utc>,
    ) -> Result<(), CoreError>;
}

/// Discards every batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullExportSink;

#[async_trait]
impl ExportSink for NullExportSink {
    async fn deliver(
        &self,
        kind: ExportKind,
        batch: &ExportBatch,
        _at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        debug!(%kind, records = batch.records, "export discarded");
        Ok(())
    }
}

/// Writes `<kind>-<YYYYmmddHHMMSS>.csv` files into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryExportSink {
    dir: PathBuf,
}

impl DirectoryExportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_path(&self, kind: ExportKind, at: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(format!("{kind}-{}.csv", at.format("%Y%m%d%H%M%S")))
    }
}

#[async_trait]
impl ExportSink for DirectoryExportSink {
    async fn deliver(
        &self,
        kind: ExportKind,
        batch: &ExportBatch,
        at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let path = self.file_path(kind, at);
        let failed = |e: std::io::Error| CoreError::Export {
            target: path.display().to_string(),
            message: e.to_string(),
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(failed)?;
        tokio::fs::write(&path, batch.body.as_bytes())
            .await
            .map_err(failed)?;
        info!(%kind, records = batch.records, path = %path.display(), "export written");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{Counter, FlowDirection};

    fn sample_source() -> Source {
        let mut source = Source::new(
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            "public",
            1,
            Duration::from_secs(1),
        );
        source.poll_time = Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 5, 0).unwrap());
        source.poll_duration = 30_000;
        source.sys_uptime = 123_456;
        source.tags.insert("region".into(), "north".into());

        let eth0 = source.interface_mut("eth0");
        eth0.if_index = 1;
        eth0.if_name = Some("eth0".into());
        eth0.if_alias = Some("uplink;core".into());
        eth0.set_admin_status(1);
        eth0.set_oper_status(1);
        eth0.set_in_octets(Counter::bits32(5_000));
        eth0.set_out_octets(Counter::bits64(9_000));
        eth0.set_poll_in_octets(100);
        eth0.set_poll_out_octets(200);
        eth0.chargeable = true;
        eth0.set_trace(true);
        eth0.tags.insert("circuit".into(), "C-42".into());

        let eth1 = source.interface_mut("eth1");
        eth1.if_index = 2;
        eth1.chargeable = true;
        eth1.direction = FlowDirection::Egress;
        eth1.set_poll_in_octets(7);
        eth1.set_poll_out_octets(3);

        source.interface_mut("eth2").chargeable = false;
        source
    }

    #[test]
    fn charging_rows_follow_direction_and_escape_alias() {
        let mut out = String::new();
        let records = charging_rows(&sample_source(), &ExportFormat::default(), &mut out);
        assert_eq!(records, 2);
        assert_eq!(
            out,
            "north;10.0.0.1;1;eth0;eth0;uplink.core;C-42;100;200;2024-03-01 12:05:00;30000;1\n\
             north;10.0.0.1;2;eth1;;;3;7;2024-03-01 12:05:00;30000;0\n"
        );
    }

    #[test]
    fn disabled_polling_excludes_from_charging() {
        let mut source = sample_source();
        source.interface_mut("eth1").set_polling(false);
        let mut out = String::new();
        assert_eq!(charging_rows(&source, &ExportFormat::default(), &mut out), 1);
        assert!(!out.contains(";eth1;"));
    }

    #[test]
    fn trace_rows_carry_raw_counters() {
        let format = ExportFormat {
            separator: ',',
            timestamp_format: "%Y%m%d%H%M".into(),
        };
        let mut out = String::new();
        assert_eq!(trace_rows(&sample_source(), &format, &mut out), 1);
        assert_eq!(out, "202403011205,10.0.0.1,1,eth0,eth0,uplink;core,1,1,5000,9000,123456\n");
    }

    #[test]
    fn file_names_embed_kind_and_time() {
        let sink = DirectoryExportSink::new("/var/spool/ifmeter");
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 5, 0).unwrap();
        assert_eq!(
            sink.file_path(ExportKind::Charging, at),
            PathBuf::from("/var/spool/ifmeter/charging-20240301120500.csv")
        );
    }

    #[tokio::test]
    async fn directory_sink_writes_batch() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectoryExportSink::new(dir.path().join("out"));
        let batch = ExportBatch {
            body: "a;b\n".into(),
            records: 1,
        };
        let at = Utc::now();
        sink.deliver(ExportKind::Trace, &batch, at).await.unwrap();
        let written = std::fs::read_to_string(sink.file_path(ExportKind::Trace, at)).unwrap();
        assert_eq!(written, "a;b\n");
    }
}
