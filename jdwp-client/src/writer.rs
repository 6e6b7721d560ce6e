// Helper functions for writing JDWP data types into command payloads

use crate::types::{Location, Value, ValueData};
use bytes::BufMut;

/// Write a JDWP string (4-byte length prefix + UTF-8 bytes)
pub fn put_string(buf: &mut Vec<u8>, value: &str) {
    let bytes = value.as_bytes();
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

pub fn put_location(buf: &mut Vec<u8>, location: &Location) {
    buf.put_u8(location.type_tag);
    buf.put_u64(location.class_id);
    buf.put_u64(location.method_id);
    buf.put_u64(location.index);
}

/// Write a tagged value
pub fn put_value(buf: &mut Vec<u8>, value: &Value) {
    buf.put_u8(value.tag);
    put_untagged_value(buf, value);
}

/// Write a value without its tag (field/array/slot setters)
pub fn put_untagged_value(buf: &mut Vec<u8>, value: &Value) {
    match value.data {
        ValueData::Byte(v) => buf.put_i8(v),
        ValueData::Char(v) => buf.put_u16(v),
        ValueData::Float(v) => buf.put_f32(v),
        ValueData::Double(v) => buf.put_f64(v),
        ValueData::Int(v) => buf.put_i32(v),
        ValueData::Long(v) => buf.put_i64(v),
        ValueData::Short(v) => buf.put_i16(v),
        ValueData::Boolean(v) => buf.put_u8(u8::from(v)),
        ValueData::Object(id) => buf.put_u64(id),
        ValueData::Void => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{read_location, read_value};

    #[test]
    fn test_location_layout() {
        let loc = Location { type_tag: 1, class_id: 2, method_id: 3, index: 4 };
        let mut buf = Vec::new();
        put_location(&mut buf, &loc);
        assert_eq!(buf.len(), 25);
        let mut slice = &buf[..];
        assert_eq!(read_location(&mut slice).unwrap(), loc);
    }

    #[test]
    fn test_boolean_is_one_byte() {
        let mut buf = Vec::new();
        put_value(&mut buf, &Value::boolean(true));
        assert_eq!(buf, vec![90, 1]);
        let mut slice = &buf[..];
        assert_eq!(read_value(&mut slice).unwrap(), Value::boolean(true));
    }
}
