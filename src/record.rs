//! Target record shapes.
//!
//! A [`ShapeDescriptor`] is the ordered field list a result's columns must
//! match. Typed records implement [`Record`] (usually through the
//! [`record!`](crate::record!) macro) and are built positionally from cast
//! values via [`FromValue`]; [`MappedRecord`] is the dynamic equivalent for
//! shapes only known at runtime.

use crate::db::Value;
use crate::error::{Result, StructError};
use std::sync::Arc;

/// Ordered, non-empty list of field names describing a target record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeDescriptor {
    fields: Arc<[String]>,
}

impl ShapeDescriptor {
    /// Creates a shape from field names. Fails when no fields are given.
    pub fn new<I, S>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(StructError::EmptyShape);
        }
        Ok(Self {
            fields: fields.into(),
        })
    }

    /// Field names in order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the shape has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of a field by name.
    pub fn position(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }

    /// True when `columns` equals the field names elementwise, in order.
    pub fn matches<S: AsRef<str>>(&self, columns: &[S]) -> bool {
        columns.len() == self.fields.len()
            && columns
                .iter()
                .zip(self.fields.iter())
                .all(|(column, field)| column.as_ref() == field)
    }
}

/// A typed record that can be built positionally from a result row.
pub trait Record: Sized {
    /// Field names in declaration order.
    fn fields() -> &'static [&'static str];

    /// Builds the record from cast values, one per field, in field order.
    fn from_values(values: Vec<Value>) -> Result<Self>;

    /// The shape result columns must match.
    fn shape() -> Result<ShapeDescriptor> {
        ShapeDescriptor::new(Self::fields().iter().copied())
    }
}

/// A record whose shape is only known at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRecord {
    shape: ShapeDescriptor,
    values: Vec<Value>,
}

impl MappedRecord {
    /// Creates a record; `values` must be as wide as the shape.
    pub fn new(shape: ShapeDescriptor, values: Vec<Value>) -> Result<Self> {
        if values.len() != shape.len() {
            return Err(StructError::FieldCountMismatch {
                expected: shape.len(),
                found: values.len(),
            });
        }
        Ok(Self { shape, values })
    }

    /// The record's shape.
    pub fn shape(&self) -> &ShapeDescriptor {
        &self.shape
    }

    /// Value of the named field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.shape.position(field).map(|i| &self.values[i])
    }

    /// Typed value of the named field.
    pub fn get_as<T: FromValue>(&self, field: &str) -> Result<T> {
        let value = self.get(field).cloned().ok_or_else(|| {
            StructError::ShapeMismatch {
                expected: vec![field.to_string()],
                found: self.shape.fields().to_vec(),
            }
        })?;
        T::from_value(value, field)
    }

    /// Values in field order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Iterates over `(field, value)` pairs in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.shape
            .fields()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Consumes the record, returning its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Renders the record as a JSON object keyed by field name.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .iter()
            .map(|(field, value)| (field.to_string(), value.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Conversion from a cast [`Value`] into a record field type.
pub trait FromValue: Sized {
    /// Converts `value`; `field` names the destination for error messages.
    fn from_value(value: Value, field: &str) -> Result<Self>;
}

fn mismatch(field: &str, expected: &'static str, value: &Value) -> StructError {
    StructError::type_mismatch(field, expected, value.type_name())
}

impl FromValue for Value {
    fn from_value(value: Value, _field: &str) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value, field: &str) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch(field, "bool", &other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value, field: &str) -> Result<Self> {
        match value {
            Value::Int(i) => Ok(i),
            other => Err(mismatch(field, "i64", &other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value, field: &str) -> Result<Self> {
        match value {
            Value::Int(i) => i32::try_from(i).map_err(|_| mismatch(field, "i32", &Value::Int(i))),
            other => Err(mismatch(field, "i32", &other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value, field: &str) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            other => Err(mismatch(field, "f64", &other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value, field: &str) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(mismatch(field, "String", &other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value, field: &str) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b),
            other => Err(mismatch(field, "bytes", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value, field: &str) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other, field).map(Some),
        }
    }
}

// Vec<u8> is taken by BYTEA, so array impls are listed per element type.
macro_rules! impl_from_value_for_vec {
    ($($ty:ty),+) => {
        $(
            impl FromValue for Vec<$ty> {
                fn from_value(value: Value, field: &str) -> Result<Self> {
                    match value {
                        Value::Array(items) => items
                            .into_iter()
                            .map(|item| <$ty as FromValue>::from_value(item, field))
                            .collect(),
                        other => Err(mismatch(field, "array", &other)),
                    }
                }
            }
        )+
    };
}

impl_from_value_for_vec!(
    Value,
    bool,
    i64,
    i32,
    f64,
    String,
    Option<bool>,
    Option<i64>,
    Option<i32>,
    Option<f64>,
    Option<String>
);

/// Takes the next value for `field` out of a row. Used by [`record!`](crate::record!).
#[doc(hidden)]
pub fn take_field<T: FromValue>(
    values: &mut impl Iterator<Item = Value>,
    field: &str,
) -> Result<T> {
    let value = values.next().ok_or_else(|| {
        StructError::type_mismatch(field, std::any::type_name::<T>(), "missing value")
    })?;
    T::from_value(value, field)
}

/// Declares a struct and implements [`Record`] for it.
///
/// ```
/// relation_to_struct::record! {
///     #[derive(Debug, PartialEq)]
///     pub struct Economist {
///         pub id: i64,
///         pub name: Option<String>,
///     }
/// }
///
/// use relation_to_struct::Record;
/// assert_eq!(Economist::fields(), &["id", "name"]);
/// ```
#[macro_export]
macro_rules! record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($field_vis:vis $field:ident : $ty:ty),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $($field_vis $field: $ty),+
        }

        impl $crate::Record for $name {
            fn fields() -> &'static [&'static str] {
                &[$(stringify!($field)),+]
            }

            fn from_values(values: ::std::vec::Vec<$crate::Value>) -> $crate::Result<Self> {
                let mut values = values.into_iter();
                ::std::result::Result::Ok(Self {
                    $($field: $crate::record::take_field::<$ty>(&mut values, stringify!($field))?),+
                })
            }
        }
    };
}
