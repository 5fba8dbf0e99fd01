//! Field writer: binds one layout field to its data source and records
//! steps into it.

use crate::fill::sentinel_value;
use crate::growth::{fit_to_rank, placement, reconcile, sentinel_shape, FieldLayout};
use crate::layout::{FieldConfig, Strategy};
use log::{debug, error, info, warn};
use nxswriter_core::{DataHolder, Error, Result, TypeCode, Value};
use nxswriter_io::{Backend, Deflate, Field, FieldSpec, Group, Node};

/// Where a field stands within the current step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StepState {
    #[default]
    AwaitingData,
    Written,
    /// Data was missing or invalid and the sentinel was written instead.
    SentinelFilled,
    /// The step failed and the error was surfaced.
    Failed,
}

/// Result of a step that did not surface an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Written,
    SentinelFilled,
}

/// Writer of a single field.
pub struct FieldWriter<B: Backend> {
    config: FieldConfig,
    dtype: TypeCode,
    layout: FieldLayout,
    canfail: bool,
    field: Field<B>,
    grew: bool,
    state: StepState,
}

impl<B: Backend> FieldWriter<B> {
    /// Creates the field under `parent`, writes its standard attributes and,
    /// for a field without a source, its static content.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedType`] for an unknown type name,
    /// [`Error::ObjectCreate`] if the field cannot be created and
    /// [`Error::DataUnavailable`] for a field with neither source nor content
    /// (unless it is a `POSTRUN` or string field).
    pub fn create(
        parent: &Group<B>,
        config: FieldConfig,
        canfail: bool,
        compression: Deflate,
    ) -> Result<Self> {
        let dtype = config.dtype()?;
        let growing = config.source.is_some() && config.strategy == Strategy::Step;
        let layout = FieldLayout::new(&config.shape, growing, config.grows)
            .map_err(|e| Error::creation("field", &config.name, e))?;
        let filter = config
            .compression
            .map(|c| {
                Deflate::new(
                    c.rate.unwrap_or(compression.rate()),
                    c.shuffle.unwrap_or(compression.shuffle()),
                )
            })
            .transpose()?;
        let shape = layout.creation_shape(canfail, config.strategy);
        let spec = FieldSpec::new(dtype, &shape)
            .with_chunk(&layout.chunk())
            .with_filter(filter)
            .growing(growing);
        let field = parent.create_field(&config.name, &spec)?;
        debug!(
            "created {} as {dtype} {shape:?} (growth axis {:?})",
            field.path(),
            layout.growth_axis
        );

        let writer = Self {
            config,
            dtype,
            layout,
            canfail,
            field,
            grew: false,
            state: StepState::AwaitingData,
        };
        writer.write_attributes()?;
        writer.write_content()?;
        Ok(writer)
    }

    fn write_attributes(&self) -> Result<()> {
        let attrs = self.field.attributes()?;
        for (name, value) in &self.config.attributes {
            attrs.write_str(name, value)?;
        }
        attrs.write_str("type", &self.config.nexus_type)?;
        if let Some(units) = &self.config.units {
            attrs.write_str("units", units)?;
        }
        attrs.write_str("nexdatas_strategy", self.config.strategy.as_str())?;
        if let Some(source) = &self.config.source {
            attrs.write_str("nexdatas_source", source)?;
        }
        if self.config.strategy == Strategy::Postrun {
            let label = self.config.postrun.as_deref().unwrap_or_default();
            attrs.write_str("postrun", label.trim())?;
        }
        Ok(())
    }

    fn write_content(&self) -> Result<()> {
        if self.config.source.is_some() {
            return Ok(());
        }
        let text = self.config.content.as_deref().map_or("", str::trim);
        if !text.is_empty() {
            let value = parse_content(text, self.config.shape.len())?;
            return self.place(&value);
        }
        if self.config.strategy != Strategy::Postrun && self.dtype != TypeCode::String {
            return Err(Error::DataUnavailable(format!(
                "{} has neither a data source nor content",
                self.config.name
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Object path of the field.
    #[must_use]
    pub fn path(&self) -> String {
        self.field.path()
    }

    #[must_use]
    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.config.strategy
    }

    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.config.source.as_deref()
    }

    #[must_use]
    pub fn dtype(&self) -> TypeCode {
        self.dtype
    }

    #[must_use]
    pub fn field(&self) -> &Field<B> {
        &self.field
    }

    #[must_use]
    pub fn canfail(&self) -> bool {
        self.canfail
    }

    /// Whether the field appends a slot on every step.
    #[must_use]
    pub fn is_growing(&self) -> bool {
        self.layout.growth_axis.is_some()
    }

    /// 1-based growth axis.
    #[must_use]
    pub fn grows(&self) -> Option<usize> {
        self.layout.growth_axis.map(|axis| axis + 1)
    }

    #[must_use]
    pub fn state(&self) -> StepState {
        self.state
    }

    /// Records one step.
    ///
    /// `data` is the step's payload, or the reason there is none. Data
    /// errors are recovered with a sentinel fill when the field can fail;
    /// structural errors always propagate.
    ///
    /// # Errors
    /// Returns the data error when the field cannot fail, or any structural
    /// error raised while growing or writing.
    pub fn record(&mut self, data: Result<&DataHolder>) -> Result<StepOutcome> {
        self.grew = false;
        self.state = StepState::AwaitingData;
        match self.write_step(data) {
            Ok(()) => {
                self.state = StepState::Written;
                Ok(StepOutcome::Written)
            }
            Err(err) if err.is_data_error() && self.canfail => {
                warn!("{}: {err}", self.path());
                match self.mark_failed(&err.to_string()) {
                    Ok(()) => {
                        self.state = StepState::SentinelFilled;
                        Ok(StepOutcome::SentinelFilled)
                    }
                    Err(fill_err) => {
                        error!("{}: sentinel fill failed: {fill_err}", self.path());
                        self.state = StepState::Failed;
                        Err(fill_err)
                    }
                }
            }
            Err(err) => {
                error!("{}: {err}", self.path());
                self.state = StepState::Failed;
                Err(err)
            }
        }
    }

    fn write_step(&mut self, data: Result<&DataHolder>) -> Result<()> {
        let holder = data?;
        if self.is_growing() {
            self.grow()?;
        }
        self.place(holder.value())
    }

    fn grow(&mut self) -> Result<()> {
        if let Some(axis) = self.layout.growth_axis {
            self.field.grow(axis, 1)?;
            self.grew = true;
        }
        Ok(())
    }

    /// Reconciles the static extents with `value` and writes it into the
    /// newest slot (or the leading region of a non-growing field).
    fn place(&self, value: &Value) -> Result<()> {
        let current = self.field.shape()?;
        let static_axes = self.layout.static_axes(current.len());
        let target = fit_to_rank(value.shape(), static_axes.len()).ok_or_else(|| {
            Error::RankMismatch(format!(
                "payload of shape {:?} does not fit {} with shape {current:?}",
                value.shape(),
                self.config.name
            ))
        })?;
        for (axis, extent) in reconcile(&current, &static_axes, Some(&target)) {
            self.field.grow(axis, extent)?;
        }
        let current = self.field.shape()?;
        let slice = placement(&current, &self.layout, &target)?;
        debug!("writing {} into {slice:?} of {current:?}", self.config.name);
        self.field.write_slice(&slice, value)
    }

    /// Tags the field as failed, appends `message` to its error log and
    /// writes the sentinel into the current slot.
    ///
    /// # Errors
    /// Returns any error raised while writing the attributes or the sentinel.
    pub fn mark_failed(&mut self, message: &str) -> Result<()> {
        let attrs = self.field.attributes()?;
        attrs.write_str("nexdatas_canfail", "FAILED")?;
        let log = match attrs.read_str("nexdatas_canfail_error")? {
            Some(previous) if !previous.is_empty() => format!("{previous}\n{message}"),
            _ => message.to_string(),
        };
        attrs.write_str("nexdatas_canfail_error", &log)?;
        info!("{} marked as failed", self.path());
        self.fill_sentinel()
    }

    fn fill_sentinel(&mut self) -> Result<()> {
        if self.is_growing() && !self.grew {
            self.grow()?;
        }
        let shape = if self.config.shape.is_empty() {
            Vec::new()
        } else {
            sentinel_shape(&self.field.shape()?, &self.layout)
        };
        self.place(&sentinel_value(self.dtype, &shape)?)
    }
}

/// Static text as a value: one token for scalars, whitespace-separated
/// tokens for spectra, one row per line beyond that.
fn parse_content(text: &str, rank: usize) -> Result<Value> {
    match rank {
        0 => Ok(Value::from(text)),
        1 => Ok(Value::from(
            text.split_whitespace()
                .map(str::to_string)
                .collect::<Vec<_>>(),
        )),
        _ => {
            let rows: Vec<Vec<String>> = text
                .lines()
                .map(|line| line.split_whitespace().map(str::to_string).collect())
                .filter(|row: &Vec<String>| !row.is_empty())
                .collect();
            let cols = rows.first().map_or(0, Vec::len);
            if rows.iter().any(|row| row.len() != cols) {
                return Err(Error::ShapeMismatch(format!(
                    "content rows of unequal length: {text:?}"
                )));
            }
            Value::from_shape_vec(&[rows.len(), cols], rows.concat())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content() {
        let value = parse_content("NXcalibration run", 0).unwrap();
        assert_eq!(value.ndim(), 0);

        let value = parse_content("1 2  3\n4", 1).unwrap();
        assert_eq!(value.shape(), &[4]);

        let value = parse_content("1 2\n3 4\n5 6", 2).unwrap();
        assert_eq!(value.shape(), &[3, 2]);
        assert_eq!(value.cast(TypeCode::Int32).unwrap().to_vec::<i32>().unwrap(), vec![1, 2, 3, 4, 5, 6]);

        assert!(matches!(parse_content("1 2\n3", 2), Err(Error::ShapeMismatch(_))));
    }
}
