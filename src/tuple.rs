//! Encoding of tuples, keys and arguments.
//!
//! Any [`serde::Serialize`] value is a [`TupleElement`]. Rust tuples (up to 8
//! elements, which covers composite keys), vectors, slices and arrays of elements
//! are [`Tuple`]s, so arity of a composite key is checked at compile time:
//!
//! ```
//! # use tarantool_pool::Tuple;
//! fn assert_tuple<T: Tuple>(_: T) {}
//! assert_tuple((566u32,));
//! assert_tuple((1u32, "name", 2.5f64));
//! assert_tuple(vec![1, 2, 3]);
//! assert_tuple(());
//! ```

use std::io::Write;

use crate::errors::EncodingError;

/// Single field of a tuple.
pub trait TupleElement {
    fn encode_into_writer<W: Write>(&self, buf: W) -> Result<(), EncodingError>;
}

impl<T: serde::Serialize + ?Sized> TupleElement for T {
    fn encode_into_writer<W: Write>(&self, mut buf: W) -> Result<(), EncodingError> {
        rmp_serde::encode::write(&mut buf, self)?;
        Ok(())
    }
}

/// Type, which can be encoded into MessagePack array.
///
/// Used for keys, tuples, update operations and arguments of `eval` and `call`.
pub trait Tuple {
    fn encode_into_writer<W: Write>(&self, buf: W) -> Result<(), EncodingError>;
}

fn write_len<W: Write>(buf: &mut W, len: usize) -> Result<(), EncodingError> {
    let len = u32::try_from(len)
        .map_err(|_| EncodingError::new(anyhow::anyhow!("tuple too long: {len}")))?;
    rmp::encode::write_array_len(buf, len)?;
    Ok(())
}

impl<T: TupleElement> Tuple for [T] {
    fn encode_into_writer<W: Write>(&self, mut buf: W) -> Result<(), EncodingError> {
        write_len(&mut buf, self.len())?;
        for x in self.iter() {
            x.encode_into_writer(&mut buf)?;
        }
        Ok(())
    }
}

impl<T: TupleElement> Tuple for Vec<T> {
    fn encode_into_writer<W: Write>(&self, buf: W) -> Result<(), EncodingError> {
        self.as_slice().encode_into_writer(buf)
    }
}

impl<T: TupleElement, const N: usize> Tuple for [T; N] {
    fn encode_into_writer<W: Write>(&self, buf: W) -> Result<(), EncodingError> {
        self.as_slice().encode_into_writer(buf)
    }
}

impl Tuple for () {
    fn encode_into_writer<W: Write>(&self, mut buf: W) -> Result<(), EncodingError> {
        rmp::encode::write_array_len(&mut buf, 0)?;
        Ok(())
    }
}

impl<T: Tuple + ?Sized> Tuple for &T {
    fn encode_into_writer<W: Write>(&self, buf: W) -> Result<(), EncodingError> {
        (**self).encode_into_writer(buf)
    }
}

macro_rules! impl_tuple_for_tuple {
    ( $len:expr => $($param:ident),+ ) => {
        impl<$($param: TupleElement),+> Tuple for ($($param,)+) {
            #[allow(non_snake_case)]
            fn encode_into_writer<W: Write>(&self, mut buf: W) -> Result<(), EncodingError> {
                rmp::encode::write_array_len(&mut buf, $len)?;
                let ($($param,)+) = self;
                $(
                    $param.encode_into_writer(&mut buf)?;
                )+
                Ok(())
            }
        }
    };
}

impl_tuple_for_tuple!(1 => T1);
impl_tuple_for_tuple!(2 => T1, T2);
impl_tuple_for_tuple!(3 => T1, T2, T3);
impl_tuple_for_tuple!(4 => T1, T2, T3, T4);
impl_tuple_for_tuple!(5 => T1, T2, T3, T4, T5);
impl_tuple_for_tuple!(6 => T1, T2, T3, T4, T5, T6);
impl_tuple_for_tuple!(7 => T1, T2, T3, T4, T5, T6, T7);
impl_tuple_for_tuple!(8 => T1, T2, T3, T4, T5, T6, T7, T8);

/// Encode tuple into standalone buffer.
pub(crate) fn encode_to_vec<T: Tuple + ?Sized>(tuple: &T) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Vec::new();
    tuple.encode_into_writer(&mut buf)?;
    Ok(buf)
}
