//! Record shapes
//!
//! A record is an immutable tuple of named, typed fields in a fixed order.
//! The store never inspects records beyond three things: encoding them,
//! decoding them, and reading a named field as an index key.
//!
//! Record types are normally declared with [`define_record!`](crate::define_record):
//!
//! ```
//! irstore::define_record! {
//!     /// A passage with a numeric rank
//!     pub struct Passage {
//!         pub passage_id: String,
//!         pub text: String,
//!         pub rank: i64,
//!     }
//! }
//! ```

mod codec;

pub use codec::{CodecError, CodecResult, FieldReader, FieldWriter};

use std::borrow::Cow;

/// Semantic type of a declared field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// UTF-8 string
    Str,
    /// Signed 64-bit integer
    Int,
}

impl FieldKind {
    /// Stable on-disk tag
    pub fn tag(&self) -> u8 {
        match self {
            FieldKind::Str => 1,
            FieldKind::Int => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(FieldKind::Str),
            2 => Some(FieldKind::Int),
            _ => None,
        }
    }
}

/// One declared field of a record shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// A Rust type that can be a record field.
pub trait FieldType: Sized {
    const KIND: FieldKind;

    fn write(&self, writer: &mut FieldWriter);

    fn read(reader: &mut FieldReader<'_>) -> CodecResult<Self>;

    /// The value as an index key
    fn key(&self) -> Cow<'_, str>;
}

impl FieldType for String {
    const KIND: FieldKind = FieldKind::Str;

    fn write(&self, writer: &mut FieldWriter) {
        writer.put_str(self);
    }

    fn read(reader: &mut FieldReader<'_>) -> CodecResult<Self> {
        reader.take_str()
    }

    fn key(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.as_str())
    }
}

impl FieldType for i64 {
    const KIND: FieldKind = FieldKind::Int;

    fn write(&self, writer: &mut FieldWriter) {
        writer.put_int(*self);
    }

    fn read(reader: &mut FieldReader<'_>) -> CodecResult<Self> {
        reader.take_int()
    }

    fn key(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }
}

/// Fixed ordered field set with stable names.
pub trait Record: Sized {
    /// Declared fields, in encoding order
    const FIELDS: &'static [FieldDef];

    /// Writes every field in declared order.
    fn encode(&self, writer: &mut FieldWriter);

    /// Reads every field in declared order.
    fn decode(reader: &mut FieldReader<'_>) -> CodecResult<Self>;

    /// Value of `field` rendered as an index key, `None` for unknown names.
    fn key(&self, field: &str) -> Option<Cow<'_, str>>;

    /// Whether `field` is one of the declared fields.
    fn has_field(field: &str) -> bool {
        Self::FIELDS.iter().any(|def| def.name == field)
    }
}

/// Decodes a full record body, rejecting trailing bytes.
pub fn decode_body<R: Record>(body: &[u8]) -> CodecResult<R> {
    let mut reader = FieldReader::new(body);
    let record = R::decode(&mut reader)?;
    reader.finish()?;
    Ok(record)
}

/// Declares a record struct and its [`Record`] implementation.
///
/// The struct gets `Debug`, `Clone`, `PartialEq` and `Eq` derives. Field
/// types must implement [`FieldType`] (`String` or `i64`).
#[macro_export]
macro_rules! define_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $(#[$fmeta:meta])* $fvis:vis $field:ident : $ty:ty ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        $vis struct $name {
            $( $(#[$fmeta])* $fvis $field: $ty, )+
        }

        impl $crate::record::Record for $name {
            const FIELDS: &'static [$crate::record::FieldDef] = &[
                $(
                    $crate::record::FieldDef {
                        name: stringify!($field),
                        kind: <$ty as $crate::record::FieldType>::KIND,
                    },
                )+
            ];

            fn encode(&self, writer: &mut $crate::record::FieldWriter) {
                $( $crate::record::FieldType::write(&self.$field, writer); )+
            }

            fn decode(
                reader: &mut $crate::record::FieldReader<'_>,
            ) -> $crate::record::CodecResult<Self> {
                Ok(Self {
                    $( $field: <$ty as $crate::record::FieldType>::read(reader)?, )+
                })
            }

            fn key(&self, field: &str) -> Option<::std::borrow::Cow<'_, str>> {
                match field {
                    $( stringify!($field) => Some($crate::record::FieldType::key(&self.$field)), )+
                    _ => None,
                }
            }
        }
    };
}
