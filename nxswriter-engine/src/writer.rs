//! Recording session: file, entry and the field writers bound to it.

use crate::config::WriterConfig;
use crate::field::{FieldWriter, StepOutcome};
use crate::layout::{EntryLayout, FieldConfig, GroupLayout, LinkLayout, Strategy};
use log::{debug, info, warn};
use nxswriter_core::{DataHolder, DecoderPool, Error, Result};
use nxswriter_io::{create_file_with_version, Backend, FileAccess, File, Group, Node};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Data of one step, keyed by source name.
#[derive(Clone, Debug, Default)]
pub struct StepRecord {
    values: BTreeMap<String, DataHolder>,
    failures: BTreeMap<String, String>,
}

impl StepRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: &str, holder: DataHolder) {
        self.failures.remove(source);
        self.values.insert(source.to_string(), holder);
    }

    /// Decodes `data` with a pooled decoder and stores the result.
    ///
    /// A decoding failure is kept against the source and surfaces when a
    /// field asks for it.
    pub fn insert_encoded(
        &mut self,
        source: &str,
        pool: &mut DecoderPool,
        decoder: &str,
        data: &[u8],
    ) {
        match pool.decode(decoder, data) {
            Ok(holder) => self.insert(source, holder),
            Err(err) => self.fail(source, &err.to_string()),
        }
    }

    /// Marks `source` as unusable for this step.
    pub fn fail(&mut self, source: &str, message: &str) {
        self.values.remove(source);
        self.failures.insert(source.to_string(), message.to_string());
    }

    /// Payload of `source`.
    ///
    /// # Errors
    /// Returns [`Error::Decoder`] for a source whose payload failed to decode
    /// and [`Error::DataUnavailable`] for a source missing from the record.
    pub fn get(&self, source: &str) -> Result<&DataHolder> {
        if let Some(message) = self.failures.get(source) {
            return Err(Error::Decoder(format!("{source}: {message}")));
        }
        self.values
            .get(source)
            .ok_or_else(|| Error::DataUnavailable(format!("no value for source {source}")))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len() + self.failures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What one write pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepReport {
    /// 1-based step number; 0 for the entry open and close passes.
    pub step: usize,
    pub written: usize,
    /// Paths of the fields that received the sentinel.
    pub failed: Vec<String>,
}

struct EntrySession<B: Backend> {
    group: Group<B>,
    fields: Vec<FieldWriter<B>>,
    steps: usize,
}

/// Drives `open_file → open_entry → record* → close_entry → close_file`.
pub struct NexusWriter<B: Backend> {
    backend: Arc<B>,
    config: WriterConfig,
    canfail: Option<bool>,
    file: Option<File<B>>,
    entry: Option<EntrySession<B>>,
}

impl<B: Backend> NexusWriter<B> {
    #[must_use]
    pub fn new(backend: Arc<B>, config: WriterConfig) -> Self {
        Self {
            backend,
            config,
            canfail: None,
            file: None,
            entry: None,
        }
    }

    /// Session-level can-fail policy; per-field settings still win.
    #[must_use]
    pub fn with_canfail(mut self, canfail: bool) -> Self {
        self.canfail = Some(canfail);
        self
    }

    pub fn set_canfail(&mut self, canfail: Option<bool>) {
        self.canfail = canfail;
    }

    #[must_use]
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    #[must_use]
    pub fn file(&self) -> Option<&File<B>> {
        self.file.as_ref()
    }

    /// Field writers of the open entry, in layout order.
    #[must_use]
    pub fn fields(&self) -> &[FieldWriter<B>] {
        match &self.entry {
            Some(entry) => &entry.fields,
            None => &[],
        }
    }

    /// Steps recorded into the open entry.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.entry.as_ref().map_or(0, |entry| entry.steps)
    }

    fn canfail_for(&self, field: &FieldConfig) -> bool {
        field
            .canfail
            .or(self.canfail)
            .unwrap_or(self.config.default_canfail)
    }

    fn open(&self) -> Result<&File<B>> {
        self.file
            .as_ref()
            .ok_or_else(|| Error::StaleHandle("no file is open".to_string()))
    }

    /// Creates the output file and tags its root group.
    ///
    /// A file still open from a previous session is closed first.
    ///
    /// # Errors
    /// Returns [`Error::ObjectCreate`] if the file cannot be created.
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        if self.file.is_some() {
            self.close_file()?;
        }
        let file = create_file_with_version(
            &self.backend,
            path,
            self.config.overwrite,
            self.config.libver,
        )?;
        let attrs = file.root()?.attributes()?;
        attrs.write_str("NX_class", "NXroot")?;
        attrs.write_str("file_name", &file.name())?;
        info!("opened {} on the {} backend", file.name(), self.backend.name());
        self.file = Some(file);
        Ok(())
    }

    /// Reopens the file in a new mode, keeping every field writer bound.
    ///
    /// # Errors
    /// Returns [`Error::StaleHandle`] without an open file, or the backend
    /// error if the file cannot be reopened.
    pub fn reopen(&self, readonly: bool, swmr: bool) -> Result<()> {
        self.open()?.reopen(FileAccess {
            readonly,
            swmr,
            libver: self.config.libver,
        })
    }

    /// Builds the entry described by `layout` and writes its `INIT` fields
    /// from `record`.
    ///
    /// # Errors
    /// Returns any structural error raised while building the tree, and data
    /// errors of `INIT` fields that cannot fail.
    pub fn open_entry(&mut self, layout: &EntryLayout, record: &StepRecord) -> Result<StepReport> {
        if let Some(entry) = &self.entry {
            warn!("{} was not closed before the next entry", entry.group.path());
            self.entry = None;
        }
        let root = self.open()?.root()?;
        let group = root.create_group(&layout.name, "NXentry")?;
        let mut fields = Vec::new();
        self.build(&group, &layout.fields, &layout.groups, &layout.links, &mut fields)?;
        info!("opened {} with {} fields", group.path(), fields.len());
        self.entry = Some(EntrySession {
            group,
            fields,
            steps: 0,
        });
        self.write_pass(Strategy::Init, record, 0)
    }

    /// Links go last in each group; targets may be created later in the walk.
    fn build(
        &self,
        group: &Group<B>,
        fields: &[FieldConfig],
        groups: &[GroupLayout],
        links: &[LinkLayout],
        writers: &mut Vec<FieldWriter<B>>,
    ) -> Result<()> {
        for config in fields {
            let canfail = self.canfail_for(config);
            writers.push(FieldWriter::create(
                group,
                config.clone(),
                canfail,
                self.config.compression,
            )?);
        }
        for layout in groups {
            let child = group.create_group(&layout.name, &layout.nxclass)?;
            self.build(&child, &layout.fields, &layout.groups, &layout.links, writers)?;
        }
        for link in links {
            group.link(&link.target, &link.name)?;
        }
        Ok(())
    }

    /// Records one step into every `STEP` field with a source.
    ///
    /// The step counter only advances when every field took the step. After
    /// an error, fields earlier in layout order keep the slot they already
    /// grew and later ones do not.
    ///
    /// # Errors
    /// Returns [`Error::StaleHandle`] without an open entry, the data error of
    /// a field that cannot fail, or any structural error.
    pub fn record(&mut self, record: &StepRecord) -> Result<StepReport> {
        let step = self
            .entry
            .as_ref()
            .ok_or_else(|| Error::StaleHandle("no entry is open".to_string()))?
            .steps
            + 1;
        let report = self.write_pass(Strategy::Step, record, step)?;
        if let Some(entry) = self.entry.as_mut() {
            entry.steps = step;
        }
        Ok(report)
    }

    /// Writes the `FINAL` fields and releases the entry.
    ///
    /// # Errors
    /// Returns [`Error::StaleHandle`] without an open entry, or the error of a
    /// `FINAL` field.
    pub fn close_entry(&mut self, record: &StepRecord) -> Result<StepReport> {
        let report = self.write_pass(Strategy::Final, record, 0)?;
        if let Some(entry) = self.entry.take() {
            info!("closed {} after {} steps", entry.group.path(), entry.steps);
            drop(entry.fields);
            entry.group.close()?;
        }
        self.open()?.flush()?;
        Ok(report)
    }

    /// Flushes and closes the file.
    ///
    /// # Errors
    /// Returns the backend error if pending data cannot be written.
    pub fn close_file(&mut self) -> Result<()> {
        if let Some(entry) = self.entry.take() {
            warn!("{} closed without its FINAL fields", entry.group.path());
        }
        if let Some(file) = self.file.take() {
            file.flush()?;
            file.close()?;
            info!("closed {}", file.name());
        }
        Ok(())
    }

    fn write_pass(&mut self, strategy: Strategy, record: &StepRecord, step: usize) -> Result<StepReport> {
        let entry = self
            .entry
            .as_mut()
            .ok_or_else(|| Error::StaleHandle("no entry is open".to_string()))?;
        let mut report = StepReport {
            step,
            ..StepReport::default()
        };
        for writer in entry
            .fields
            .iter_mut()
            .filter(|writer| writer.strategy() == strategy)
        {
            let Some(source) = writer.source().map(str::to_string) else {
                continue;
            };
            match writer.record(record.get(&source))? {
                StepOutcome::Written => report.written += 1,
                StepOutcome::SentinelFilled => report.failed.push(writer.path()),
            }
        }
        debug!(
            "{strategy} pass {step}: {} written, {} filled",
            report.written,
            report.failed.len()
        );
        Ok(report)
    }
}

impl<B: Backend> Drop for NexusWriter<B> {
    fn drop(&mut self) {
        if let Err(err) = self.close_file() {
            warn!("closing on drop failed: {err}");
        }
    }
}
