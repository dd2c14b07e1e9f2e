//! Structural reads and writes.
//!
//! [`Parse`] and [`Compose`] are the seams through which aggregate types
//! move in and out of packets. Primitives, strings, tuples and `Vec`s are
//! covered here; domain types implement the traits themselves when their
//! wire layout is not a plain field sequence.
//!
//! Slices are length-prefixed by a [`Length`], whose width depends on the
//! dialect. [`Id`] covers numeric identifiers that widen to 64 bits on
//! Unity. [`B64`] and [`Vl64`] expose the raw Shockwave encodings for the
//! rare packets that use them outside their usual positions.

use bytes::Bytes;

use crate::client::ClientType;
use crate::encoding;
use crate::error::{ProtocolError, Result};
use crate::packet::Packet;

/// A value that can be read from a packet at its cursor.
pub trait Parse: Sized {
    fn parse(p: &mut Packet) -> Result<Self>;
}

/// A value that can be written to a packet at its cursor.
pub trait Compose {
    fn compose(&self, p: &mut Packet) -> Result<()>;
}

impl Parse for bool {
    fn parse(p: &mut Packet) -> Result<Self> {
        p.read_bool()
    }
}

impl Compose for bool {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        p.write_bool(*self).map(|_| ())
    }
}

impl Parse for u8 {
    fn parse(p: &mut Packet) -> Result<Self> {
        p.read_byte()
    }
}

impl Compose for u8 {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        p.write_byte(*self).map(|_| ())
    }
}

impl Parse for i16 {
    fn parse(p: &mut Packet) -> Result<Self> {
        p.read_short()
    }
}

impl Compose for i16 {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        p.write_short(*self).map(|_| ())
    }
}

impl Parse for u16 {
    fn parse(p: &mut Packet) -> Result<Self> {
        Ok(p.read_short()? as u16)
    }
}

impl Compose for u16 {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        p.write_short(*self as i16).map(|_| ())
    }
}

impl Parse for i32 {
    fn parse(p: &mut Packet) -> Result<Self> {
        p.read_int()
    }
}

impl Compose for i32 {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        p.write_int(*self).map(|_| ())
    }
}

impl Parse for u32 {
    fn parse(p: &mut Packet) -> Result<Self> {
        Ok(p.read_int()? as u32)
    }
}

impl Compose for u32 {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        p.write_int(*self as i32).map(|_| ())
    }
}

impl Parse for i64 {
    fn parse(p: &mut Packet) -> Result<Self> {
        p.read_long()
    }
}

impl Compose for i64 {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        p.write_long(*self).map(|_| ())
    }
}

impl Parse for f32 {
    fn parse(p: &mut Packet) -> Result<Self> {
        p.read_float()
    }
}

impl Compose for f32 {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        p.write_float(*self).map(|_| ())
    }
}

impl Parse for f64 {
    fn parse(p: &mut Packet) -> Result<Self> {
        Ok(p.read_float()? as f64)
    }
}

impl Compose for f64 {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        p.write_float(*self as f32).map(|_| ())
    }
}

impl Parse for String {
    fn parse(p: &mut Packet) -> Result<Self> {
        p.read_string()
    }
}

impl Compose for String {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        p.write_string(self).map(|_| ())
    }
}

impl Compose for str {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        p.write_string(self).map(|_| ())
    }
}

impl Compose for &str {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        p.write_string(self).map(|_| ())
    }
}

/// Raw bytes, written without any length prefix.
impl Compose for Bytes {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        p.write_bytes(self).map(|_| ())
    }
}

/// No payload. Useful for sending bare messages.
impl Compose for () {
    fn compose(&self, _p: &mut Packet) -> Result<()> {
        Ok(())
    }
}

/// A unique numeric identifier.
///
/// Encoded as an int on Flash and Shockwave and a long on Unity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Id(pub i64);

impl Parse for Id {
    fn parse(p: &mut Packet) -> Result<Self> {
        match p.client {
            ClientType::Flash | ClientType::Shockwave => Ok(Id(p.read_int()? as i64)),
            ClientType::Unity => Ok(Id(p.read_long()?)),
            ClientType::Unknown => Err(ProtocolError::Unsupported {
                op: "id",
                client: p.client,
            }),
        }
    }
}

impl Compose for Id {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        match p.client {
            ClientType::Flash | ClientType::Shockwave => {
                p.write_int(self.0 as i32).map(|_| ())
            }
            ClientType::Unity => p.write_long(self.0).map(|_| ()),
            ClientType::Unknown => Err(ProtocolError::Unsupported {
                op: "id",
                client: p.client,
            }),
        }
    }
}

impl From<Id> for i64 {
    fn from(id: Id) -> Self {
        id.0
    }
}

/// The length of a collection.
///
/// Encoded as a short on Unity and Shockwave, otherwise as an int.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Length(pub i32);

impl Parse for Length {
    fn parse(p: &mut Packet) -> Result<Self> {
        match p.client {
            ClientType::Unity | ClientType::Shockwave => Ok(Length(p.read_short()? as i32)),
            _ => Ok(Length(p.read_int()?)),
        }
    }
}

impl Compose for Length {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        match p.client {
            ClientType::Unity | ClientType::Shockwave => {
                p.write_short(self.0 as i16).map(|_| ())
            }
            _ => p.write_int(self.0).map(|_| ()),
        }
    }
}

/// A fixed two-byte base-64 encoded integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct B64(pub i16);

impl Parse for B64 {
    fn parse(p: &mut Packet) -> Result<Self> {
        let raw = p.read_bytes(2)?;
        Ok(B64(encoding::b64_decode(&raw) as i16))
    }
}

impl Compose for B64 {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        let mut buf = [0u8; 2];
        encoding::b64_encode(&mut buf, self.0 as i32);
        p.write_bytes(&buf).map(|_| ())
    }
}

/// A variable-length base-64 encoded integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Vl64(pub i32);

impl Parse for Vl64 {
    fn parse(p: &mut Packet) -> Result<Self> {
        let first = p.read_byte_at(p.pos)?;
        let n = encoding::vl64_encoded_len(first);
        if n == 0 || n > 6 {
            return Err(ProtocolError::InvalidVl64Length(n));
        }
        let raw = p.read_bytes(n)?;
        Ok(Vl64(encoding::vl64_decode(&raw)))
    }
}

impl Compose for Vl64 {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        let mut buf = [0u8; 6];
        let n = encoding::vl64_len(self.0);
        encoding::vl64_encode(&mut buf[..n], self.0);
        p.write_bytes(&buf[..n]).map(|_| ())
    }
}

/// Collections are prefixed by a [`Length`].
impl<T: Parse> Parse for Vec<T> {
    fn parse(p: &mut Packet) -> Result<Self> {
        let Length(n) = p.read()?;
        let n = usize::try_from(n).unwrap_or(0);
        let mut items = Vec::with_capacity(n.min(1024));
        for _ in 0..n {
            items.push(p.read()?);
        }
        Ok(items)
    }
}

impl<T: Compose> Compose for Vec<T> {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        self.as_slice().compose(p)
    }
}

impl<T: Compose> Compose for [T] {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        Length(self.len() as i32).compose(p)?;
        for item in self {
            item.compose(p)?;
        }
        Ok(())
    }
}

impl<T: Parse> Parse for Option<T> {
    /// Reads a value if any payload remains past the cursor.
    fn parse(p: &mut Packet) -> Result<Self> {
        if p.pos < p.len() {
            Ok(Some(p.read()?))
        } else {
            Ok(None)
        }
    }
}

macro_rules! impl_tuple {
    ($($name:ident),+) => {
        impl<$($name: Parse),+> Parse for ($($name,)+) {
            fn parse(p: &mut Packet) -> Result<Self> {
                Ok(($($name::parse(p)?,)+))
            }
        }

        #[allow(non_snake_case)]
        impl<$($name: Compose),+> Compose for ($($name,)+) {
            fn compose(&self, p: &mut Packet) -> Result<()> {
                let ($($name,)+) = self;
                $($name.compose(p)?;)+
                Ok(())
            }
        }
    };
}

impl_tuple!(A);
impl_tuple!(A, B);
impl_tuple!(A, B, C);
impl_tuple!(A, B, C, D);
impl_tuple!(A, B, C, D, E);
impl_tuple!(A, B, C, D, E, F);
impl_tuple!(A, B, C, D, E, F, G);
impl_tuple!(A, B, C, D, E, F, G, H);
impl_tuple!(A, B, C, D, E, F, G, H, I);
impl_tuple!(A, B, C, D, E, F, G, H, I, J);
impl_tuple!(A, B, C, D, E, F, G, H, I, J, K);
impl_tuple!(A, B, C, D, E, F, G, H, I, J, K, L);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Direction, Header};

    fn packet(client: ClientType, dir: Direction) -> Packet {
        Packet::new(client, Header::new(dir, 0))
    }

    #[test]
    fn test_tuple_round_trip() {
        let mut p = packet(ClientType::Flash, Direction::Out);
        p.write(&(7i32, "seven".to_string(), true)).unwrap();
        p.pos = 0;
        let (n, s, b): (i32, String, bool) = p.read().unwrap();
        assert_eq!((n, s.as_str(), b), (7, "seven", true));
    }

    #[test]
    fn test_vec_round_trip_uses_length_prefix() {
        for client in [ClientType::Flash, ClientType::Unity, ClientType::Shockwave] {
            let mut p = packet(client, Direction::In);
            p.write(&vec![1i32, 2, 3]).unwrap();
            p.pos = 0;
            let items: Vec<i32> = p.read().unwrap();
            assert_eq!(items, vec![1, 2, 3], "{client}");
        }
    }

    #[test]
    fn test_length_width_per_dialect() {
        let mut p = packet(ClientType::Flash, Direction::Out);
        p.write(&Length(1)).unwrap();
        assert_eq!(p.len(), 4);

        let mut p = packet(ClientType::Unity, Direction::Out);
        p.write(&Length(1)).unwrap();
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn test_id_width_per_dialect() {
        let mut p = packet(ClientType::Flash, Direction::Out);
        p.write(&Id(42)).unwrap();
        assert_eq!(p.len(), 4);

        let mut p = packet(ClientType::Unity, Direction::Out);
        p.write(&Id(42)).unwrap();
        assert_eq!(p.len(), 8);
        p.pos = 0;
        assert_eq!(p.read::<Id>().unwrap(), Id(42));
    }

    #[test]
    fn test_bytes_compose_raw() {
        let mut p = packet(ClientType::Shockwave, Direction::Out);
        p.write(&Bytes::from_static(b"new")).unwrap();
        assert_eq!(p.data(), b"new");
    }

    #[test]
    fn test_b64_vl64_wrappers() {
        let mut p = packet(ClientType::Flash, Direction::Out);
        p.write(&B64(1337)).unwrap();
        p.write(&Vl64(-256)).unwrap();
        p.pos = 0;
        assert_eq!(p.read::<B64>().unwrap(), B64(1337));
        assert_eq!(p.read::<Vl64>().unwrap(), Vl64(-256));
    }

    #[test]
    fn test_optional_tail() {
        let mut p = packet(ClientType::Flash, Direction::Out);
        p.write(&1i32).unwrap();
        p.pos = 0;
        assert_eq!(p.read::<i32>().unwrap(), 1);
        assert_eq!(p.read::<Option<i32>>().unwrap(), None);
    }
}
