// Helper functions for reading JDWP data types from buffers

use crate::protocol::{JdwpError, JdwpResult};
use crate::types::{Location, TypeTag, Value, ValueData};
use bytes::Buf;

fn ensure(buf: &&[u8], needed: usize, what: &str) -> JdwpResult<()> {
    if buf.remaining() < needed {
        return Err(JdwpError::Protocol(format!("Not enough data for {}", what)));
    }
    Ok(())
}

/// Read a JDWP string (4-byte length prefix + UTF-8 bytes)
pub fn read_string(buf: &mut &[u8]) -> JdwpResult<String> {
    ensure(buf, 4, "string length")?;

    let len = buf.get_u32() as usize;

    if buf.remaining() < len {
        return Err(JdwpError::Protocol(format!(
            "Not enough data for string: expected {}, got {}",
            len,
            buf.remaining()
        )));
    }

    let bytes = &buf[..len];
    buf.advance(len);

    String::from_utf8(bytes.to_vec())
        .map_err(|e| JdwpError::Protocol(format!("Invalid UTF-8 in string: {}", e)))
}

/// Read a u32
pub fn read_u32(buf: &mut &[u8]) -> JdwpResult<u32> {
    ensure(buf, 4, "u32")?;
    Ok(buf.get_u32())
}

/// Read a i32
pub fn read_i32(buf: &mut &[u8]) -> JdwpResult<i32> {
    ensure(buf, 4, "i32")?;
    Ok(buf.get_i32())
}

/// Read a u8
pub fn read_u8(buf: &mut &[u8]) -> JdwpResult<u8> {
    ensure(buf, 1, "u8")?;
    Ok(buf.get_u8())
}

/// Read a u16
pub fn read_u16(buf: &mut &[u8]) -> JdwpResult<u16> {
    ensure(buf, 2, "u16")?;
    Ok(buf.get_u16())
}

/// Read a u64
pub fn read_u64(buf: &mut &[u8]) -> JdwpResult<u64> {
    ensure(buf, 8, "u64")?;
    Ok(buf.get_u64())
}

/// Read a boolean (one byte, non-zero is true)
pub fn read_bool(buf: &mut &[u8]) -> JdwpResult<bool> {
    Ok(read_u8(buf)? != 0)
}

/// Read a location (type tag, class, method, index)
pub fn read_location(buf: &mut &[u8]) -> JdwpResult<Location> {
    let type_tag = read_u8(buf)?;
    let class_id = read_u64(buf)?;
    let method_id = read_u64(buf)?;
    let index = read_u64(buf)?;

    Ok(Location {
        type_tag,
        class_id,
        method_id,
        index,
    })
}

/// Read a tagged value (tag byte followed by the value)
pub fn read_value(buf: &mut &[u8]) -> JdwpResult<Value> {
    let tag = read_u8(buf)?;
    let data = read_untagged_value(tag, buf)?;
    Ok(Value { tag, data })
}

/// Read a value whose tag is known from context
pub fn read_untagged_value(tag: u8, buf: &mut &[u8]) -> JdwpResult<ValueData> {
    let data = match tag {
        t if t == TypeTag::Byte as u8 => {
            ensure(buf, 1, "byte")?;
            ValueData::Byte(buf.get_i8())
        }
        t if t == TypeTag::Char as u8 => ValueData::Char(read_u16(buf)?),
        t if t == TypeTag::Double as u8 => {
            ensure(buf, 8, "double")?;
            ValueData::Double(buf.get_f64())
        }
        t if t == TypeTag::Float as u8 => {
            ensure(buf, 4, "float")?;
            ValueData::Float(buf.get_f32())
        }
        t if t == TypeTag::Int as u8 => ValueData::Int(read_i32(buf)?),
        t if t == TypeTag::Long as u8 => {
            ensure(buf, 8, "long")?;
            ValueData::Long(buf.get_i64())
        }
        t if t == TypeTag::Short as u8 => {
            ensure(buf, 2, "short")?;
            ValueData::Short(buf.get_i16())
        }
        t if t == TypeTag::Boolean as u8 => ValueData::Boolean(read_bool(buf)?),
        t if t == TypeTag::Void as u8 => ValueData::Void,
        t if TypeTag::is_object_tag(t) => ValueData::Object(read_u64(buf)?),
        _ => return Err(JdwpError::Protocol(format!("Unknown value tag: {}", tag))),
    };
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_tagged_int() {
        let data = [73u8, 0, 0, 1, 0];
        let mut buf = &data[..];
        let value = read_value(&mut buf).unwrap();
        assert_eq!(value, Value::int(256));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_read_object_value() {
        let data = [115u8, 0, 0, 0, 0, 0, 0, 0x12, 0x34];
        let mut buf = &data[..];
        let value = read_value(&mut buf).unwrap();
        assert_eq!(value.tag, TypeTag::String as u8);
        assert_eq!(value.object_id(), Some(0x1234));
    }

    #[test]
    fn test_short_buffer_is_an_error_not_a_panic() {
        let data = [74u8, 0, 0];
        let mut buf = &data[..];
        assert!(read_value(&mut buf).is_err());
    }

    #[test]
    fn test_read_string() {
        let data = [0u8, 0, 0, 2, b'h', b'i'];
        let mut buf = &data[..];
        assert_eq!(read_string(&mut buf).unwrap(), "hi");
    }
}
