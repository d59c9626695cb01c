//! Set of utility functions to help with serialization of field types that
//! don't have a [`lightning::util::ser::Writeable`] implementation.

use lightning::ln::msgs::DecodeError;
use lightning::util::ser::{BigSize, Readable, Writeable, Writer};

/// Upper bound on the declared length of serialized vectors, to avoid
/// pre-allocating based on a corrupted length prefix.
pub(crate) const MAX_VEC_SIZE: u64 = 1000000;

/// Writes a `String` prefixed by its length as a `BigSize`.
pub fn write_string<W: Writer>(input: &str, writer: &mut W) -> Result<(), ::std::io::Error> {
    let len = BigSize(input.len() as u64);
    len.write(writer)?;
    let bytes = input.as_bytes();

    for b in bytes {
        b.write(writer)?;
    }

    Ok(())
}

/// Reads a `String` prefixed by its length as a `BigSize`.
pub fn read_string<R: ::std::io::Read>(reader: &mut R) -> Result<String, DecodeError> {
    let len: BigSize = Readable::read(reader)?;

    if len.0 > MAX_VEC_SIZE {
        return Err(DecodeError::InvalidValue);
    }

    let mut buf = Vec::with_capacity(len.0 as usize);

    for _ in 0..len.0 {
        let b: u8 = Readable::read(reader)?;
        buf.push(b);
    }

    String::from_utf8(buf).map_err(|_| DecodeError::InvalidValue)
}

/// Writes a vector of writeable elements prefixed by its length.
pub fn write_vec<W: Writer, T>(input: &[T], writer: &mut W) -> Result<(), ::std::io::Error>
where
    T: Writeable,
{
    write_vec_cb(input, writer, &<T as Writeable>::write)
}

/// Reads a vector of readable elements prefixed by its length.
pub fn read_vec<R: ::std::io::Read, T>(reader: &mut R) -> Result<Vec<T>, DecodeError>
where
    T: Readable,
{
    read_vec_cb(reader, &Readable::read)
}

/// Writes a vector of elements prefixed by its length using the provided
/// callback for each element.
pub fn write_vec_cb<W: Writer, T, F>(
    input: &[T],
    writer: &mut W,
    cb: &F,
) -> Result<(), ::std::io::Error>
where
    F: Fn(&T, &mut W) -> Result<(), ::std::io::Error>,
{
    BigSize(input.len() as u64).write(writer)?;
    for s in input {
        cb(s, writer)?;
    }
    Ok(())
}

/// Reads a vector of elements prefixed by its length using the provided
/// callback for each element.
pub fn read_vec_cb<R: ::std::io::Read, T, F>(reader: &mut R, cb: &F) -> Result<Vec<T>, DecodeError>
where
    F: Fn(&mut R) -> Result<T, DecodeError>,
{
    let len: BigSize = Readable::read(reader)?;
    if len.0 > MAX_VEC_SIZE {
        return Err(DecodeError::InvalidValue);
    }
    let mut res = Vec::new();
    for _ in 0..len.0 {
        res.push(cb(reader)?);
    }

    Ok(res)
}

/// Writes an optional writeable value.
pub fn write_option<W: Writer, T>(input: &Option<T>, writer: &mut W) -> Result<(), ::std::io::Error>
where
    T: Writeable,
{
    write_option_cb(input, writer, &<T as Writeable>::write)
}

/// Reads an optional readable value.
pub fn read_option<R: ::std::io::Read, T>(reader: &mut R) -> Result<Option<T>, DecodeError>
where
    T: Readable,
{
    read_option_cb(reader, &Readable::read)
}

/// Writes an optional value using the provided callback.
pub fn write_option_cb<W: Writer, T, F>(
    input: &Option<T>,
    writer: &mut W,
    cb: &F,
) -> Result<(), ::std::io::Error>
where
    F: Fn(&T, &mut W) -> Result<(), ::std::io::Error>,
{
    match input {
        Some(s) => {
            1_u8.write(writer)?;
            cb(s, writer)
        }
        None => 0_u8.write(writer),
    }
}

/// Reads an optional value using the provided callback.
pub fn read_option_cb<R: ::std::io::Read, T, F>(
    reader: &mut R,
    cb: &F,
) -> Result<Option<T>, DecodeError>
where
    F: Fn(&mut R) -> Result<T, DecodeError>,
{
    let prefix: u8 = Readable::read(reader)?;
    let res = match prefix {
        0 => None,
        1 => Some(cb(reader)?),
        _ => return Err(DecodeError::InvalidValue),
    };
    Ok(res)
}
