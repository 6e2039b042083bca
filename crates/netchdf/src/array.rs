//! Materialized values.

/// Values of one read, in row-major order, with their shape.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedArray {
    pub shape: Vec<usize>,
    pub values: ArrayValues,
}

/// Element storage of a [`TypedArray`], one variant per decoded element kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValues {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    /// Fixed and variable-length strings, enum labels and object references.
    String(Vec<String>),
    /// One byte vector per element.
    Opaque(Vec<Vec<u8>>),
    Struct(StructArray),
    /// One array per element.
    Vlen(Vec<TypedArray>),
}

/// Column-wise compound values: one array per member, each with the
/// element count of the parent as its leading dimension.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructArray {
    pub members: Vec<(String, TypedArray)>,
}

impl StructArray {
    pub fn member(&self, name: &str) -> Option<&TypedArray> {
        self.members.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(n, _)| n.as_str())
    }
}

macro_rules! accessor {
    ($name:ident, $variant:ident, $t:ty) => {
        pub fn $name(&self) -> Option<&[$t]> {
            match &self.values {
                ArrayValues::$variant(v) => Some(v),
                _ => None,
            }
        }
    };
}

impl TypedArray {
    pub fn new(shape: Vec<usize>, values: ArrayValues) -> Self {
        Self { shape, values }
    }

    /// A zero-element array of the same kind as `values`.
    pub fn empty_like(shape: Vec<usize>, values: &ArrayValues) -> Self {
        let values = match values {
            ArrayValues::I8(_) => ArrayValues::I8(Vec::new()),
            ArrayValues::U8(_) => ArrayValues::U8(Vec::new()),
            ArrayValues::I16(_) => ArrayValues::I16(Vec::new()),
            ArrayValues::U16(_) => ArrayValues::U16(Vec::new()),
            ArrayValues::I32(_) => ArrayValues::I32(Vec::new()),
            ArrayValues::U32(_) => ArrayValues::U32(Vec::new()),
            ArrayValues::I64(_) => ArrayValues::I64(Vec::new()),
            ArrayValues::U64(_) => ArrayValues::U64(Vec::new()),
            ArrayValues::F32(_) => ArrayValues::F32(Vec::new()),
            ArrayValues::F64(_) => ArrayValues::F64(Vec::new()),
            ArrayValues::String(_) => ArrayValues::String(Vec::new()),
            ArrayValues::Opaque(_) => ArrayValues::Opaque(Vec::new()),
            ArrayValues::Struct(s) => ArrayValues::Struct(StructArray {
                members: s
                    .members
                    .iter()
                    .map(|(n, a)| (n.clone(), TypedArray::empty_like(vec![0], &a.values)))
                    .collect(),
            }),
            ArrayValues::Vlen(_) => ArrayValues::Vlen(Vec::new()),
        };
        Self { shape, values }
    }

    /// Number of elements. Struct arrays count rows.
    pub fn len(&self) -> usize {
        match &self.values {
            ArrayValues::I8(v) => v.len(),
            ArrayValues::U8(v) => v.len(),
            ArrayValues::I16(v) => v.len(),
            ArrayValues::U16(v) => v.len(),
            ArrayValues::I32(v) => v.len(),
            ArrayValues::U32(v) => v.len(),
            ArrayValues::I64(v) => v.len(),
            ArrayValues::U64(v) => v.len(),
            ArrayValues::F32(v) => v.len(),
            ArrayValues::F64(v) => v.len(),
            ArrayValues::String(v) => v.len(),
            ArrayValues::Opaque(v) => v.len(),
            ArrayValues::Struct(_) => self.shape.iter().product(),
            ArrayValues::Vlen(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    accessor!(as_i8, I8, i8);
    accessor!(as_u8, U8, u8);
    accessor!(as_i16, I16, i16);
    accessor!(as_u16, U16, u16);
    accessor!(as_i32, I32, i32);
    accessor!(as_u32, U32, u32);
    accessor!(as_i64, I64, i64);
    accessor!(as_u64, U64, u64);
    accessor!(as_f32, F32, f32);
    accessor!(as_f64, F64, f64);
    accessor!(as_strings, String, String);

    pub fn as_struct(&self) -> Option<&StructArray> {
        match &self.values {
            ArrayValues::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vlen(&self) -> Option<&[TypedArray]> {
        match &self.values {
            ArrayValues::Vlen(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric values widened to f64; `None` for non-numeric arrays.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        fn widen<T: Copy + Into<f64>>(v: &[T]) -> Vec<f64> {
            v.iter().map(|&x| x.into()).collect()
        }
        Some(match &self.values {
            ArrayValues::I8(v) => widen(v),
            ArrayValues::U8(v) => widen(v),
            ArrayValues::I16(v) => widen(v),
            ArrayValues::U16(v) => widen(v),
            ArrayValues::I32(v) => widen(v),
            ArrayValues::U32(v) => widen(v),
            ArrayValues::I64(v) => v.iter().map(|&x| x as f64).collect(),
            ArrayValues::U64(v) => v.iter().map(|&x| x as f64).collect(),
            ArrayValues::F32(v) => widen(v),
            ArrayValues::F64(v) => v.clone(),
            _ => return None,
        })
    }

    /// Numeric values as i64, truncating floats; `None` for non-numeric
    /// arrays.
    pub fn to_i64_vec(&self) -> Option<Vec<i64>> {
        Some(match &self.values {
            ArrayValues::I8(v) => v.iter().map(|&x| x as i64).collect(),
            ArrayValues::U8(v) => v.iter().map(|&x| x as i64).collect(),
            ArrayValues::I16(v) => v.iter().map(|&x| x as i64).collect(),
            ArrayValues::U16(v) => v.iter().map(|&x| x as i64).collect(),
            ArrayValues::I32(v) => v.iter().map(|&x| x as i64).collect(),
            ArrayValues::U32(v) => v.iter().map(|&x| x as i64).collect(),
            ArrayValues::I64(v) => v.clone(),
            ArrayValues::U64(v) => v.iter().map(|&x| x as i64).collect(),
            ArrayValues::F32(v) => v.iter().map(|&x| x as i64).collect(),
            ArrayValues::F64(v) => v.iter().map(|&x| x as i64).collect(),
            _ => return None,
        })
    }
}
