//! Turning raw element bytes into [`TypedArray`]s.

use std::collections::HashMap;

use netchdf_format::{FileContext, FormatError};
use netchdf_io::Endian;

use crate::array::{ArrayValues, StructArray, TypedArray};
use crate::error::{Error, Result};
use crate::types::{ReferenceType, StringPadding, TypeDescriptor};
use crate::vlen::{HeapCache, VlenRef};

/// Decodes element bytes of one type, resolving heap and reference
/// indirection against an open file.
pub(crate) struct Materializer<'a> {
    pub ctx: FileContext<'a>,
    pub heap: &'a HeapCache,
    /// Object header address to absolute path.
    pub paths: &'a HashMap<u64, String>,
}

fn each<T>(data: &[u8], size: usize, n: usize, f: impl Fn(&[u8]) -> T) -> Vec<T> {
    data.chunks_exact(size).take(n).map(f).collect()
}

fn fixed_string(b: &[u8], padding: StringPadding) -> String {
    let text = match padding {
        StringPadding::SpacePad => {
            let end = b.iter().rposition(|&c| c != b' ' && c != 0).map_or(0, |p| p + 1);
            &b[..end]
        }
        _ => &b[..b.iter().position(|&c| c == 0).unwrap_or(b.len())],
    };
    String::from_utf8_lossy(text).into_owned()
}

fn integers(data: &[u8], size: usize, n: usize, signed: bool, order: Endian) -> Result<ArrayValues> {
    Ok(match (size, signed) {
        (1, true) => ArrayValues::I8(each(data, 1, n, |b| b[0] as i8)),
        (1, false) => ArrayValues::U8(each(data, 1, n, |b| b[0])),
        (2, true) => ArrayValues::I16(each(data, 2, n, |b| order.read_i16(b))),
        (2, false) => ArrayValues::U16(each(data, 2, n, |b| order.read_u16(b))),
        (4, true) => ArrayValues::I32(each(data, 4, n, |b| order.read_i32(b))),
        (4, false) => ArrayValues::U32(each(data, 4, n, |b| order.read_u32(b))),
        (8, true) => ArrayValues::I64(each(data, 8, n, |b| order.read_i64(b))),
        (8, false) => ArrayValues::U64(each(data, 8, n, |b| order.read_u64(b))),
        (s, _) => return Err(Error::Unsupported(format!("{s}-byte integer"))),
    })
}

impl<'a> Materializer<'a> {
    pub fn new(ctx: FileContext<'a>, heap: &'a HeapCache, paths: &'a HashMap<u64, String>) -> Self {
        Self { ctx, heap, paths }
    }

    /// Decode `shape` elements of `dt` from `data`. An empty shape is one
    /// scalar element.
    pub fn materialize(&self, data: &[u8], shape: &[usize], dt: &TypeDescriptor) -> Result<TypedArray> {
        let n: usize = shape.iter().product();
        let size = dt.size();
        let needed = n.saturating_mul(size);
        if data.len() < needed {
            return Err(FormatError::InvalidData(format!(
                "{} values of {dt} need {needed} bytes, have {}",
                n,
                data.len()
            ))
            .into());
        }
        if size == 0 && n > 0 {
            return Err(FormatError::InvalidData(format!("zero-sized element type {dt}")).into());
        }
        let values = match dt {
            TypeDescriptor::Fixed { size, order, signed } => integers(data, *size, n, *signed, *order)?,
            TypeDescriptor::BitField { size, order } => integers(data, *size, n, false, *order)?,
            TypeDescriptor::Time { size, order } => match size {
                4 => ArrayValues::I32(each(data, 4, n, |b| order.read_i32(b))),
                8 => ArrayValues::I64(each(data, 8, n, |b| order.read_i64(b))),
                s => return Err(Error::Unsupported(format!("{s}-byte time"))),
            },
            TypeDescriptor::Float { size, order } => match size {
                2 => ArrayValues::F32(each(data, 2, n, |b| {
                    half::f16::from_bits(order.read_u16(b)).to_f32()
                })),
                4 => ArrayValues::F32(each(data, 4, n, |b| order.read_f32(b))),
                8 => ArrayValues::F64(each(data, 8, n, |b| order.read_f64(b))),
                s => return Err(Error::Unsupported(format!("{s}-byte float"))),
            },
            TypeDescriptor::String {
                variable_length: false,
                size,
                padding,
                ..
            } => ArrayValues::String(each(data, *size, n, |b| fixed_string(b, *padding))),
            TypeDescriptor::String { size, .. } => {
                let mut out = Vec::with_capacity(n);
                for i in 0..n {
                    let r = VlenRef::parse(data, i * size, self.ctx.offset_size)?;
                    let bytes = self.heap.get(&self.ctx, r.id)?;
                    out.push(fixed_string(&bytes, StringPadding::NullTerminate));
                }
                ArrayValues::String(out)
            }
            TypeDescriptor::Enum {
                size, order, values, ..
            } => ArrayValues::String(each(data, *size, n, |b| {
                let v = order.read_uint(b, *size);
                values
                    .get(&v)
                    .cloned()
                    .unwrap_or_else(|| format!("Unknown enum value={v}"))
            })),
            TypeDescriptor::Opaque { size, .. } => ArrayValues::Opaque(each(data, *size, n, <[u8]>::to_vec)),
            TypeDescriptor::Reference { size, kind, .. } => match kind {
                ReferenceType::Object => {
                    let width = (*size).min(8);
                    ArrayValues::String(each(data, *size, n, |b| {
                        let address = Endian::Little.read_uint(b, width);
                        self.paths
                            .get(&address)
                            .cloned()
                            .unwrap_or_else(|| address.to_string())
                    }))
                }
                ReferenceType::DatasetRegion => {
                    return Err(Error::Unsupported("dataset region references".into()))
                }
            },
            TypeDescriptor::Compound { size, members, .. } => {
                let mut columns = Vec::with_capacity(members.len());
                for m in members {
                    let width = m.datatype.size() * m.count();
                    let mut gathered = Vec::with_capacity(width * n);
                    for row in 0..n {
                        let start = row * size + m.offset;
                        let bytes = data.get(start..start + width).ok_or_else(|| {
                            FormatError::InvalidData(format!(
                                "member {} at {}..{} overruns a {size}-byte compound",
                                m.name,
                                m.offset,
                                m.offset + width
                            ))
                        })?;
                        gathered.extend_from_slice(bytes);
                    }
                    let mut member_shape = vec![n];
                    member_shape.extend(m.dims.iter().map(|&d| d as usize));
                    columns.push((m.name.clone(), self.materialize(&gathered, &member_shape, &m.datatype)?));
                }
                ArrayValues::Struct(StructArray { members: columns })
            }
            TypeDescriptor::Vlen { size, base, .. } => {
                let mut out = Vec::with_capacity(n);
                for i in 0..n {
                    let r = VlenRef::parse(data, i * size, self.ctx.offset_size)?;
                    let bytes = self.heap.get(&self.ctx, r.id)?;
                    out.push(self.materialize(&bytes, &[r.length as usize], base)?);
                }
                ArrayValues::Vlen(out)
            }
            TypeDescriptor::Array { base, dims, .. } => {
                let mut full = shape.to_vec();
                full.extend(dims.iter().map(|&d| d as usize));
                return self.materialize(data, &full, base);
            }
        };
        Ok(TypedArray::new(shape.to_vec(), values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CharacterSet, CompoundField};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn run(data: &[u8], shape: &[usize], dt: &TypeDescriptor) -> Result<TypedArray> {
        let heap = HeapCache::new();
        let mut paths = HashMap::new();
        paths.insert(0x60, "/grid/lat".to_string());
        let ctx = FileContext::new(&[], 0, 8, 8);
        Materializer::new(ctx, &heap, &paths).materialize(data, shape, dt)
    }

    fn int(size: usize, signed: bool, order: Endian) -> TypeDescriptor {
        TypeDescriptor::Fixed { size, order, signed }
    }

    #[test]
    fn integers_follow_byte_order() {
        let a = run(&[0, 1, 0, 2], &[2], &int(2, false, Endian::Big)).unwrap();
        assert_eq!(a.as_u16(), Some(&[1, 2][..]));
        let a = run(&[0xff, 0xff, 0xff, 0xff], &[], &int(4, true, Endian::Little)).unwrap();
        assert_eq!(a.as_i32(), Some(&[-1][..]));
        assert!(a.shape.is_empty());
    }

    #[test]
    fn half_floats_widen() {
        let dt = TypeDescriptor::Float {
            size: 2,
            order: Endian::Little,
        };
        let a = run(&[0x00, 0x3c, 0x00, 0xc0], &[2], &dt).unwrap();
        assert_eq!(a.as_f32(), Some(&[1.0, -2.0][..]));
    }

    #[test]
    fn fixed_strings_keep_rank() {
        let dt = TypeDescriptor::String {
            size: 4,
            order: Endian::Little,
            padding: StringPadding::NullTerminate,
            charset: CharacterSet::Ascii,
            variable_length: false,
        };
        let a = run(b"ab\0\0cdef", &[2], &dt).unwrap();
        assert_eq!(a.shape, vec![2]);
        assert_eq!(a.as_strings().unwrap(), &["ab".to_string(), "cdef".to_string()]);

        let dt = TypeDescriptor::String {
            size: 4,
            order: Endian::Little,
            padding: StringPadding::SpacePad,
            charset: CharacterSet::Ascii,
            variable_length: false,
        };
        let a = run(b"ab  ", &[1], &dt).unwrap();
        assert_eq!(a.as_strings().unwrap(), &["ab".to_string()]);
    }

    #[test]
    fn enum_values_become_labels() {
        let values: BTreeMap<u64, String> = [(0, "RED".to_string()), (1, "BLUE".to_string())].into();
        let dt = TypeDescriptor::Enum {
            size: 1,
            order: Endian::Little,
            values: Arc::new(values),
            typedef: None,
        };
        let a = run(&[1, 0, 7], &[3], &dt).unwrap();
        assert_eq!(
            a.as_strings().unwrap(),
            &["BLUE".to_string(), "RED".to_string(), "Unknown enum value=7".to_string()]
        );
    }

    #[test]
    fn compound_is_column_wise() {
        let dt = TypeDescriptor::Compound {
            size: 6,
            order: Endian::Little,
            members: vec![
                CompoundField {
                    name: "id".into(),
                    offset: 0,
                    dims: vec![],
                    datatype: int(2, false, Endian::Little),
                },
                CompoundField {
                    name: "xy".into(),
                    offset: 2,
                    dims: vec![2],
                    datatype: int(1, true, Endian::Little),
                },
                CompoundField {
                    name: "flag".into(),
                    offset: 4,
                    dims: vec![],
                    datatype: int(1, false, Endian::Little),
                },
            ],
            typedef: None,
        };
        let data = [1, 0, 0xff, 2, 9, 0, 2, 0, 3, 4, 8, 0];
        let a = run(&data, &[2], &dt).unwrap();
        let s = a.as_struct().unwrap();
        assert_eq!(s.member("id").unwrap().as_u16(), Some(&[1, 2][..]));
        let xy = s.member("xy").unwrap();
        assert_eq!(xy.shape, vec![2, 2]);
        assert_eq!(xy.as_i8(), Some(&[-1, 2, 3, 4][..]));
        assert_eq!(s.member("flag").unwrap().as_u8(), Some(&[9, 8][..]));
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn array_type_extends_shape() {
        let dt = TypeDescriptor::Array {
            size: 3,
            order: Endian::Little,
            base: Box::new(int(1, false, Endian::Little)),
            dims: vec![3],
        };
        let a = run(&[1, 2, 3, 4, 5, 6], &[2], &dt).unwrap();
        assert_eq!(a.shape, vec![2, 3]);
        assert_eq!(a.len(), 6);
    }

    #[test]
    fn object_references_become_paths() {
        let dt = TypeDescriptor::Reference {
            size: 8,
            order: Endian::Little,
            kind: ReferenceType::Object,
        };
        let mut data = 0x60u64.to_le_bytes().to_vec();
        data.extend_from_slice(&0x99u64.to_le_bytes());
        let a = run(&data, &[2], &dt).unwrap();
        assert_eq!(a.as_strings().unwrap(), &["/grid/lat".to_string(), "153".to_string()]);

        let region = TypeDescriptor::Reference {
            size: 12,
            order: Endian::Little,
            kind: ReferenceType::DatasetRegion,
        };
        assert!(matches!(run(&[0; 12], &[1], &region), Err(Error::Unsupported(_))));
    }

    #[test]
    fn short_data_is_rejected() {
        let err = run(&[1, 2, 3], &[2], &int(2, true, Endian::Little)).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::InvalidData(_))));
    }
}
