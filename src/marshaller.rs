// ABOUTME: Thread-shareable entry point that builds an independent encoder or decoder per call.
// ABOUTME: Byte-vector, writer and reader conveniences live here.

use crate::config::MarshallerConfig;
use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::Result;
use crate::fallback::{FallbackMarshaller, JsonFallback};
use crate::io::{DataInput, DataOutput, SliceInput, StreamInput, StreamOutput};
use crate::registry::TypeResolver;
use crate::value::Value;
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::trace;

/// Marshals object graphs against a shared type resolver.
///
/// A `Marshaller` is `Send + Sync`; the graphs it handles are not. Each call
/// gets a fresh encoder or decoder, so concurrent calls never share a handle
/// table or hook context.
#[derive(Clone)]
pub struct Marshaller {
    resolver: Arc<dyn TypeResolver>,
    fallback: Arc<dyn FallbackMarshaller>,
    config: MarshallerConfig,
}

impl Marshaller {
    pub fn new(resolver: Arc<dyn TypeResolver>) -> Self {
        Self::with_config(resolver, MarshallerConfig::default())
    }

    pub fn with_config(resolver: Arc<dyn TypeResolver>, config: MarshallerConfig) -> Self {
        Self {
            resolver,
            fallback: Arc::new(JsonFallback),
            config,
        }
    }

    /// Replace the fallback marshaller.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackMarshaller>) -> Self {
        self.fallback = fallback;
        self
    }

    #[must_use]
    pub fn config(&self) -> &MarshallerConfig {
        &self.config
    }

    #[must_use]
    pub fn resolver(&self) -> &Arc<dyn TypeResolver> {
        &self.resolver
    }

    /// An encoder over `out` sharing this marshaller's resolver and settings.
    pub fn encoder<O: DataOutput>(&self, out: O) -> Encoder<O> {
        Encoder::with_config(out, self.resolver.clone(), self.config.clone())
            .with_fallback(self.fallback.clone())
    }

    /// A decoder over `input` sharing this marshaller's resolver and settings.
    pub fn decoder<I: DataInput>(&self, input: I) -> Decoder<I> {
        Decoder::with_config(input, self.resolver.clone(), self.config.clone())
            .with_fallback(self.fallback.clone())
    }

    /// Encode a graph into a byte vector.
    pub fn marshal(&self, value: &Value) -> Result<Vec<u8>> {
        let mut encoder = self.encoder(Vec::new());
        encoder.write_root(value)?;
        let bytes = encoder.into_inner();
        trace!(len = bytes.len(), "marshalled graph");
        Ok(bytes)
    }

    /// Encode a graph into a writer.
    pub fn marshal_to_writer<W: Write>(&self, value: &Value, writer: W) -> Result<()> {
        let mut encoder = self.encoder(StreamOutput::new(writer));
        encoder.write_root(value)?;
        encoder.into_inner().flush()
    }

    /// Decode a graph from a complete byte slice; trailing bytes are an error.
    pub fn unmarshal(&self, bytes: &[u8]) -> Result<Value> {
        let mut decoder = self.decoder(SliceInput::new(bytes));
        let value = decoder.read_root()?;
        decoder.get_ref().finish()?;
        Ok(value)
    }

    /// Decode one graph from a reader, leaving any further input unread.
    pub fn unmarshal_from_reader<R: Read>(&self, reader: R) -> Result<Value> {
        self.decoder(StreamInput::new(reader)).read_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::registry::Registry;

    fn marshaller() -> Marshaller {
        Marshaller::new(Arc::new(Registry::new()))
    }

    #[test]
    fn test_marshaller_is_thread_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Marshaller>();
    }

    #[test]
    fn test_scalar_wire_bytes() {
        let m = marshaller();
        assert_eq!(m.marshal(&Value::Null).unwrap(), vec![0x70]);
        assert_eq!(m.marshal(&Value::Int(1)).unwrap(), vec![3, 0, 0, 0, 1]);
        assert_eq!(m.marshal(&"ab".into()).unwrap(), vec![18, 0, 0, 0, 2, b'a', b'b']);
    }

    #[test]
    fn test_writer_and_reader() {
        let m = marshaller();
        let mut buf = Vec::new();
        m.marshal_to_writer(&Value::Long(-5), &mut buf).unwrap();
        let back = m.unmarshal_from_reader(buf.as_slice()).unwrap();
        assert_eq!(back, Value::Long(-5));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let m = marshaller();
        let mut bytes = m.marshal(&Value::Bool(true)).unwrap();
        bytes.push(0);
        assert!(matches!(m.unmarshal(&bytes), Err(Error::TrailingBytes)));
    }

    #[test]
    fn test_truncated_input() {
        let m = marshaller();
        assert!(matches!(m.unmarshal(&[3, 0, 0]), Err(Error::Truncated)));
        assert!(matches!(m.unmarshal(&[]), Err(Error::Truncated)));
    }
}
