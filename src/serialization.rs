//! Writers for entities and collections.
//!
//! Both writers stream entities straight into the underlying writer through
//! their `Serialize` impls, so `undefined` properties are left out exactly as
//! in `to_json_string`.

use std::io::Write;

use crate::collection::Collection;
use crate::entity::Entity;

/// Error type for serialization operations
#[derive(Debug)]
pub enum SerializationError {
    Json(serde_json::Error),
    Io(std::io::Error),
}

impl From<serde_json::Error> for SerializationError {
    fn from(err: serde_json::Error) -> Self {
        SerializationError::Json(err)
    }
}

impl From<std::io::Error> for SerializationError {
    fn from(err: std::io::Error) -> Self {
        SerializationError::Io(err)
    }
}

impl std::fmt::Display for SerializationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerializationError::Json(e) => write!(f, "JSON error: {}", e),
            SerializationError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for SerializationError {}

/// NDJSON writer: one entity per line.
pub struct NdjsonWriter<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Writes the entity's defined properties as one line.
    pub fn write_entity(&mut self, entity: &Entity) -> Result<(), SerializationError> {
        serde_json::to_writer(&mut self.writer, entity)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// One line per element, in collection order.
    pub fn write_collection(&mut self, collection: &Collection) -> Result<(), SerializationError> {
        collection.iter().try_for_each(|entity| self.write_entity(entity))
    }

    /// Lines written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn flush(&mut self) -> Result<(), SerializationError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Streams entities into a single JSON array.
pub struct JsonArrayWriter<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonArrayWriter<W> {
    /// Writes the opening bracket.
    pub fn new(mut writer: W) -> Result<Self, SerializationError> {
        writer.write_all(b"[")?;
        Ok(Self { writer, written: 0 })
    }

    pub fn write_entity(&mut self, entity: &Entity) -> Result<(), SerializationError> {
        if self.written > 0 {
            self.writer.write_all(b",")?;
        }
        serde_json::to_writer(&mut self.writer, entity)?;
        self.written += 1;
        Ok(())
    }

    pub fn write_collection(&mut self, collection: &Collection) -> Result<(), SerializationError> {
        collection.iter().try_for_each(|entity| self.write_entity(entity))
    }

    /// Closes the bracket and flushes. Returns the number of elements written.
    pub fn finish(mut self) -> Result<usize, SerializationError> {
        self.writer.write_all(b"]")?;
        self.writer.flush()?;
        tracing::debug!("wrote JSON array of {} element(s)", self.written);
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use serde_json::json;

    fn people() -> Collection {
        let kind = EntityType::new("Person")
            .with_field("name", "")
            .with_field("nick", crate::value::FieldValue::Undefined)
            .into_shared();
        Collection::from_json(json!([{"name": "Alice"}, {"name": "Bob"}]), Some(kind)).unwrap()
    }

    #[test]
    fn test_ndjson_writer() {
        let mut buf = Vec::new();
        let mut writer = NdjsonWriter::new(&mut buf);

        writer.write_collection(&people()).unwrap();
        writer.flush().unwrap();

        let output = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines, vec![r#"{"name":"Alice"}"#, r#"{"name":"Bob"}"#]);
    }

    #[test]
    fn test_json_array_writer() {
        let mut buf = Vec::new();
        let mut writer = JsonArrayWriter::new(&mut buf).unwrap();

        writer.write_collection(&people()).unwrap();
        writer.finish().unwrap();

        let output = String::from_utf8(buf).unwrap();
        assert_eq!(output, r#"[{"name":"Alice"},{"name":"Bob"}]"#);
    }

    #[test]
    fn test_writers_take_single_entities() {
        let list = people();

        let mut buf = Vec::new();
        let mut writer = JsonArrayWriter::new(&mut buf).unwrap();
        writer.write_entity(&list[1]).unwrap();
        writer.write_collection(&list).unwrap();
        assert_eq!(writer.finish().unwrap(), 3);
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            r#"[{"name":"Bob"},{"name":"Alice"},{"name":"Bob"}]"#
        );

        let mut buf = Vec::new();
        let mut writer = NdjsonWriter::new(&mut buf);
        writer.write_entity(&list[0]).unwrap();
        assert_eq!(writer.written(), 1);
        writer.flush().unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "{\"name\":\"Alice\"}\n");
    }

    #[test]
    fn test_empty_array() {
        let mut buf = Vec::new();
        let writer = JsonArrayWriter::new(&mut buf).unwrap();
        assert_eq!(writer.finish().unwrap(), 0);
        assert_eq!(buf, b"[]");
    }
}
