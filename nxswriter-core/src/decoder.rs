//! Registry of named binary payload decoders.

use crate::{DataFormat, DataHolder, Error, Result, TypeCode, Value};
use std::collections::BTreeMap;

/// Turns an opaque byte payload into a typed value.
pub trait Decoder: Send {
    /// Decoder name reported to clients.
    fn name(&self) -> &str;

    /// Logical format of decoded values.
    fn format(&self) -> DataFormat;

    /// Element type of decoded values.
    fn dtype(&self) -> TypeCode;

    /// Stores a payload for the next [`Decoder::decode`] call.
    ///
    /// # Errors
    /// Returns [`Error::Decoder`] if the payload is malformed.
    fn load(&mut self, data: &[u8]) -> Result<()>;

    /// Shape of the loaded payload once decoded.
    fn shape(&self) -> Vec<usize>;

    /// Decodes the loaded payload.
    ///
    /// # Errors
    /// Returns [`Error::Decoder`] if nothing is loaded or decoding fails.
    fn decode(&self) -> Result<Value>;
}

/// Decodes UTF-8 bytes into a scalar string.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    data: Option<Vec<u8>>,
}

impl Decoder for Utf8Decoder {
    fn name(&self) -> &str {
        "UTF8"
    }

    fn format(&self) -> DataFormat {
        DataFormat::Scalar
    }

    fn dtype(&self) -> TypeCode {
        TypeCode::String
    }

    fn load(&mut self, data: &[u8]) -> Result<()> {
        self.data = Some(data.to_vec());
        Ok(())
    }

    fn shape(&self) -> Vec<usize> {
        Vec::new()
    }

    fn decode(&self) -> Result<Value> {
        let data = self
            .data
            .as_deref()
            .ok_or_else(|| Error::Decoder("UTF8: no data loaded".to_string()))?;
        let text = std::str::from_utf8(data).map_err(|e| Error::Decoder(format!("UTF8: {e}")))?;
        Ok(Value::from(text))
    }
}

/// Named decoders available to data sources.
pub struct DecoderPool {
    decoders: BTreeMap<String, Box<dyn Decoder>>,
}

impl Default for DecoderPool {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderPool {
    /// Pool with the built-in `UTF8` decoder.
    #[must_use]
    pub fn new() -> Self {
        let mut decoders: BTreeMap<String, Box<dyn Decoder>> = BTreeMap::new();
        decoders.insert("UTF8".to_string(), Box::new(Utf8Decoder::default()));
        Self { decoders }
    }

    #[must_use]
    pub fn has_decoder(&self, name: &str) -> bool {
        self.decoders.contains_key(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Decoder> {
        self.decoders.get(name).map(|decoder| decoder.as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut dyn Decoder> {
        match self.decoders.get_mut(name) {
            Some(decoder) => Some(decoder.as_mut()),
            None => None,
        }
    }

    /// Registers a decoder under `name`, replacing any previous one.
    ///
    /// # Errors
    /// Returns [`Error::Decoder`] when the registration name or the decoder's
    /// own name is empty.
    pub fn append(&mut self, name: &str, decoder: Box<dyn Decoder>) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::Decoder("decoder registered without a name".to_string()));
        }
        if decoder.name().trim().is_empty() {
            return Err(Error::Decoder(format!(
                "decoder registered as '{name}' does not report a name"
            )));
        }
        self.decoders.insert(name.to_string(), decoder);
        Ok(())
    }

    pub fn pop(&mut self, name: &str) -> Option<Box<dyn Decoder>> {
        self.decoders.remove(name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.decoders.keys().map(String::as_str).collect()
    }

    /// Loads `data` into the named decoder and decodes it.
    ///
    /// # Errors
    /// Returns [`Error::Decoder`] for an unknown decoder or a decoding failure,
    /// and [`Error::RankMismatch`] if the decoded value contradicts the
    /// decoder's declared format.
    pub fn decode(&mut self, name: &str, data: &[u8]) -> Result<DataHolder> {
        let decoder = self
            .get_mut(name)
            .ok_or_else(|| Error::Decoder(format!("unknown decoder {name}")))?;
        decoder.load(data)?;
        let value = decoder.decode()?;
        DataHolder::new(decoder.format(), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counts {
        data: Vec<u8>,
    }

    impl Decoder for Counts {
        fn name(&self) -> &str {
            "COUNTS"
        }

        fn format(&self) -> DataFormat {
            DataFormat::Spectrum
        }

        fn dtype(&self) -> TypeCode {
            TypeCode::UInt8
        }

        fn load(&mut self, data: &[u8]) -> Result<()> {
            self.data = data.to_vec();
            Ok(())
        }

        fn shape(&self) -> Vec<usize> {
            vec![self.data.len()]
        }

        fn decode(&self) -> Result<Value> {
            Ok(Value::from(self.data.clone()))
        }
    }

    #[test]
    fn test_builtin_utf8() {
        let mut pool = DecoderPool::new();
        assert!(pool.has_decoder("UTF8"));
        let holder = pool.decode("UTF8", "NXentry".as_bytes()).unwrap();
        assert_eq!(holder.format(), DataFormat::Scalar);
        assert_eq!(holder.value().to_vec::<String>().unwrap(), vec!["NXentry".to_string()]);

        let err = pool.decode("UTF8", &[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, Error::Decoder(_)));
    }

    #[test]
    fn test_append_pop() {
        let mut pool = DecoderPool::new();
        pool.append("COUNTS", Box::new(Counts { data: Vec::new() })).unwrap();
        assert_eq!(pool.names(), vec!["COUNTS", "UTF8"]);

        let holder = pool.decode("COUNTS", &[1, 2, 3]).unwrap();
        assert_eq!(holder.shape(), &[3]);
        assert_eq!(pool.get("COUNTS").map(|decoder| decoder.shape()), Some(vec![3]));

        assert!(pool.pop("COUNTS").is_some());
        assert!(!pool.has_decoder("COUNTS"));
        assert!(pool.decode("COUNTS", &[1]).is_err());
    }

    #[test]
    fn test_append_rejects_unnamed() {
        let mut pool = DecoderPool::new();
        let err = pool
            .append(" ", Box::new(Counts { data: Vec::new() }))
            .unwrap_err();
        assert!(matches!(err, Error::Decoder(_)));
        assert_eq!(pool.names(), vec!["UTF8"]);
    }
}
