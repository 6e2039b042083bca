//! End-to-end tests over small files assembled byte by byte: schema
//! discovery, typed reads, sections, links and user types.

mod common;

use std::io::Write;

use common::*;
use netchdf::{ArrayValues, Error, Hdf5File, ReadOptions, Section, TypeDescriptor, TypedefKind};
use rstest::rstest;

fn open(bytes: Vec<u8>) -> Hdf5File {
    init_tracing();
    Hdf5File::from_bytes(bytes, ReadOptions::default()).unwrap()
}

fn f64_bytes(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn i32_bytes(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// `/temp` (2x3 f64, contiguous) and `/sub/counts` (4 i32, compact).
fn simple_file() -> Vec<u8> {
    let mut w = Writer::new(Superblock::V0);
    let temp: Vec<f64> = (0..6).map(|i| i as f64 * 1.5).collect();
    let t = contiguous(
        &mut w,
        &f64_type(),
        &[2, 3],
        &f64_bytes(&temp),
        vec![string_attribute("units", "K"), i32_attribute("valid_range", &[0, 100])],
    );
    let counts = dataset(&mut w, &i32_type(), &[4], compact_layout(&i32_bytes(&[1, 2, 3, 4])), vec![]);
    let sub = v0_group(&mut w, &[Entry::Hard("counts", counts)], vec![]);
    let root = v0_group(
        &mut w,
        &[Entry::Hard("temp", t), Entry::Hard("sub", sub)],
        vec![string_attribute("title", "small test file")],
    );
    w.finish(root)
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

#[test]
fn schema_of_a_symbol_table_file() {
    let file = open(simple_file());
    assert_eq!(file.superblock_version(), 0);

    let root = file.root();
    assert_eq!(root.path, "/");
    assert_eq!(root.attribute("title").unwrap().as_str(), Some("small test file"));
    assert_eq!(root.variables.len(), 1);
    assert_eq!(root.groups.len(), 1);

    let temp = root.variable("temp").unwrap();
    assert_eq!(temp.path, "/temp");
    assert_eq!(temp.shape, vec![2, 3]);
    assert!(matches!(temp.datatype, TypeDescriptor::Float { size: 8, .. }));
    assert!(!temp.is_chunked());
    assert_eq!(temp.attribute("units").unwrap().as_str(), Some("K"));
    assert_eq!(temp.attribute("valid_range").unwrap().values.as_i32(), Some(&[0, 100][..]));

    let sub = root.find_group("sub").unwrap();
    assert_eq!(sub.path, "/sub");
    let counts = sub.variable("counts").unwrap();
    assert_eq!(counts.path, "/sub/counts");
    assert!(std::ptr::eq(file.find_variable("/sub/counts").unwrap(), counts));
    assert!(root.find_group("/sub/").is_some());
}

#[test]
fn missing_paths_are_not_found() {
    let file = open(simple_file());
    assert!(matches!(file.find_variable("/nope"), Err(Error::NotFound(p)) if p == "/nope"));
    assert!(file.root().find_group("sub/deeper").is_none());
    assert!(file.root().variable("counts").is_none());
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

#[test]
fn whole_and_sectioned_reads() {
    let file = open(simple_file());
    let temp = file.find_variable("/temp").unwrap();

    let all = file.read_section(temp, None).unwrap();
    assert_eq!(all.shape, vec![2, 3]);
    assert_eq!(all.as_f64().unwrap(), &[0.0, 1.5, 3.0, 4.5, 6.0, 7.5]);

    let part = file
        .read_section(temp, Some(&Section::new(vec![1, 1], vec![1, 2])))
        .unwrap();
    assert_eq!(part.shape, vec![1, 2]);
    assert_eq!(part.as_f64().unwrap(), &[6.0, 7.5]);

    let counts = file.find_variable("/sub/counts").unwrap();
    let tail = file
        .read_section(counts, Some(&Section::new(vec![2], vec![2])))
        .unwrap();
    assert_eq!(tail.as_i32().unwrap(), &[3, 4]);
}

#[test]
fn empty_section_reads_nothing() {
    let file = open(simple_file());
    let temp = file.find_variable("/temp").unwrap();
    let none = file
        .read_section(temp, Some(&Section::new(vec![0, 3], vec![2, 0])))
        .unwrap();
    assert!(none.is_empty());
    assert_eq!(none.shape, vec![2, 0]);
}

#[rstest]
#[case::negative_start(vec![-1, 0], vec![1, 1])]
#[case::past_the_end(vec![1, 2], vec![1, 2])]
#[case::wrong_rank(vec![0], vec![1])]
#[case::ragged(vec![0, 0], vec![1])]
fn bad_sections_are_range_errors(#[case] start: Vec<i64>, #[case] shape: Vec<u64>) {
    let file = open(simple_file());
    let temp = file.find_variable("/temp").unwrap();
    let err = file.read_section(temp, Some(&Section::new(start, shape))).unwrap_err();
    assert!(matches!(err, Error::Range(_)), "{err}");
    assert!(matches!(file.chunk_iterator(temp, Some(&Section::new(vec![5, 5], vec![1, 1])), None), Err(Error::Range(_))));
}

#[test]
fn unallocated_storage_reads_the_fill_value() {
    let mut w = Writer::new(Superblock::V0);
    let v = dataset(
        &mut w,
        &i32_type(),
        &[3],
        contiguous_layout(UNDEF, 12),
        vec![msg(FILL_VALUE, fill_value(&(-7i32).to_le_bytes()))],
    );
    let root = v0_group(&mut w, &[Entry::Hard("v", v)], vec![]);
    let file = open(w.finish(root));
    let v = file.find_variable("/v").unwrap();
    assert_eq!(file.read_section(v, None).unwrap().as_i32().unwrap(), &[-7, -7, -7]);
}

#[test]
fn scalar_dataset_has_empty_shape() {
    let mut w = Writer::new(Superblock::V0);
    let address = w.put(&2.5f64.to_le_bytes());
    let v = w.put(&v1_header(&[
        msg(DATASPACE, scalar_space()),
        msg(DATATYPE, f64_type()),
        msg(LAYOUT, contiguous_layout(address, 8)),
    ]));
    let root = v0_group(&mut w, &[Entry::Hard("pi_ish", v)], vec![]);
    let file = open(w.finish(root));
    let v = file.find_variable("/pi_ish").unwrap();
    assert!(v.shape.is_empty());
    let value = file.read_section(v, None).unwrap();
    assert_eq!(value.as_f64().unwrap(), &[2.5]);
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[test]
fn enum_values_read_as_labels() {
    let mut w = Writer::new(Superblock::V0);
    let dt = enum_u8_type(&[("RED", 0), ("BLUE", 1)]);
    let v = contiguous(&mut w, &dt, &[3], &[1, 0, 5], vec![]);
    let root = v0_group(&mut w, &[Entry::Hard("color", v)], vec![]);
    let file = open(w.finish(root));

    let color = file.find_variable("/color").unwrap();
    let labels = file.read_section(color, None).unwrap();
    assert_eq!(
        labels.as_strings().unwrap(),
        &["BLUE".to_string(), "RED".into(), "Unknown enum value=5".into()]
    );

    let typedef = file.root().typedef("color").unwrap();
    assert!(matches!(&typedef.kind, TypedefKind::Enum { base_size: 1, values } if values.len() == 2));
    assert_eq!(color.datatype.typedef(), Some(typedef.id));
}

#[test]
fn compound_values_read_column_wise() {
    let mut w = Writer::new(Superblock::V0);
    let dt = compound_type(12, &[("x", 0, i32_type()), ("y", 4, f64_type())]);
    let mut data = Vec::new();
    for (x, y) in [(1i32, 0.5f64), (2, 1.5)] {
        data.extend_from_slice(&x.to_le_bytes());
        data.extend_from_slice(&y.to_le_bytes());
    }
    let v = contiguous(&mut w, &dt, &[2], &data, vec![]);
    let root = v0_group(&mut w, &[Entry::Hard("points", v)], vec![]);
    let file = open(w.finish(root));

    let points = file.find_variable("/points").unwrap();
    let values = file.read_section(points, None).unwrap();
    let rows = values.as_struct().unwrap();
    assert_eq!(rows.names().collect::<Vec<_>>(), vec!["x", "y"]);
    assert_eq!(rows.member("x").unwrap().as_i32().unwrap(), &[1, 2]);
    assert_eq!(rows.member("y").unwrap().as_f64().unwrap(), &[0.5, 1.5]);
    assert_eq!(values.len(), 2);
    assert_eq!(file.root().typedefs.len(), 1);
}

#[test]
fn variable_length_strings_come_from_the_global_heap() {
    let mut w = Writer::new(Superblock::V0);
    let heap = global_heap(&mut w, &[b"alpha".to_vec(), b"be".to_vec()]);
    let mut data = vlen_element(5, heap, 1);
    data.extend(vlen_element(2, heap, 2));
    let v = contiguous(&mut w, &vlen_string_type(), &[2], &data, vec![]);
    let root = v0_group(&mut w, &[Entry::Hard("names", v)], vec![]);
    let file = open(w.finish(root));

    let names = file.find_variable("/names").unwrap();
    assert!(names.datatype.is_string());
    let values = file.read_section(names, None).unwrap();
    assert_eq!(values.as_strings().unwrap(), &["alpha".to_string(), "be".into()]);
}

#[test]
fn variable_length_sequences() {
    let mut w = Writer::new(Superblock::V0);
    let heap = global_heap(&mut w, &[i32_bytes(&[1, 2, 3]), i32_bytes(&[9])]);
    let mut data = vlen_element(3, heap, 1);
    data.extend(vlen_element(1, heap, 2));
    let v = contiguous(&mut w, &vlen_type(&i32_type()), &[2], &data, vec![]);
    let root = v0_group(&mut w, &[Entry::Hard("ragged", v)], vec![]);
    let file = open(w.finish(root));

    let ragged = file.find_variable("/ragged").unwrap();
    let values = file.read_section(ragged, None).unwrap();
    let rows = values.as_vlen().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].as_i32().unwrap(), &[1, 2, 3]);
    assert_eq!(rows[1].as_i32().unwrap(), &[9]);
}

#[test]
fn object_references_resolve_to_paths() {
    let mut w = Writer::new(Superblock::V0);
    let target = contiguous(&mut w, &u8_type(), &[1], &[7], vec![]);
    let refs = contiguous(&mut w, &object_ref_type(), &[1], &target.to_le_bytes(), vec![]);
    let root = v0_group(&mut w, &[Entry::Hard("target", target), Entry::Hard("refs", refs)], vec![]);
    let file = open(w.finish(root));

    let refs = file.find_variable("/refs").unwrap();
    let values = file.read_section(refs, None).unwrap();
    assert_eq!(values.values, ArrayValues::String(vec!["/target".into()]));
}

#[test]
fn identical_committed_types_share_one_typedef() {
    let mut w = Writer::new(Superblock::V0);
    let dt = compound_type(8, &[("a", 0, i32_type()), ("b", 4, i32_type())]);
    let first = w.put(&v1_header(&[msg(DATATYPE, dt.clone())]));
    let second = w.put(&v1_header(&[msg(DATATYPE, dt)]));

    let data = i32_bytes(&[1, 2]);
    let in_g1 = {
        let address = w.put(&data);
        w.put(&v1_header(&[
            msg(DATASPACE, dataspace(&[1], None)),
            shared(DATATYPE, first),
            msg(LAYOUT, contiguous_layout(address, 8)),
        ]))
    };
    let in_g2 = {
        let address = w.put(&data);
        w.put(&v1_header(&[
            msg(DATASPACE, dataspace(&[1], None)),
            shared(DATATYPE, second),
            msg(LAYOUT, contiguous_layout(address, 8)),
        ]))
    };
    let g1 = v0_group(&mut w, &[Entry::Hard("a", in_g1)], vec![]);
    let g2 = v0_group(&mut w, &[Entry::Hard("b", in_g2)], vec![]);
    let root = v0_group(
        &mut w,
        &[
            Entry::Hard("pair", first),
            Entry::Hard("pair_copy", second),
            Entry::Hard("g1", g1),
            Entry::Hard("g2", g2),
        ],
        vec![],
    );
    let file = open(w.finish(root));

    let root = file.root();
    assert_eq!(root.typedefs.len(), 1);
    assert_eq!(root.typedefs[0].name, "pair");
    let a = file.find_variable("/g1/a").unwrap();
    let b = file.find_variable("/g2/b").unwrap();
    assert_eq!(a.datatype.typedef(), Some(root.typedefs[0].id));
    assert_eq!(a.datatype.typedef(), b.datatype.typedef());
    assert!(root.find_group("g1").unwrap().typedefs.is_empty());

    let values = file.read_section(b, None).unwrap();
    assert_eq!(values.as_struct().unwrap().member("b").unwrap().as_i32().unwrap(), &[2]);
}

#[test]
fn typedef_lives_with_its_only_user() {
    let mut w = Writer::new(Superblock::V0);
    let v = contiguous(&mut w, &enum_u8_type(&[("OFF", 0), ("ON", 1)]), &[2], &[0, 1], vec![]);
    let inner = v0_group(&mut w, &[Entry::Hard("switch", v)], vec![]);
    let root = v0_group(&mut w, &[Entry::Hard("inner", inner)], vec![]);
    let file = open(w.finish(root));

    assert!(file.root().typedefs.is_empty());
    let inner = file.root().group("inner").unwrap();
    assert_eq!(inner.typedefs.len(), 1);
    assert_eq!(inner.typedefs[0].name, "switch");
}

// ---------------------------------------------------------------------------
// Links and newer file layouts
// ---------------------------------------------------------------------------

#[test]
fn version_2_file_with_link_messages() {
    let mut w = Writer::new(Superblock::V2);
    let d = w.put(&v2_header(&[
        msg(DATASPACE, dataspace(&[3], None)),
        msg(DATATYPE, f32_type()),
        msg(LAYOUT, compact_layout(&[1.0f32, 2.0, 4.0].iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>())),
    ]));
    let g = v2_group(&mut w, vec![hard_link("d", d)], vec![]);
    let root = v2_group(
        &mut w,
        vec![hard_link("g", g), soft_link("alias", "/g/d"), soft_link("dangling", "/g/none")],
        vec![],
    );
    let file = Hdf5File::from_bytes(w.finish(root), ReadOptions::default().verify_checksums(true)).unwrap();
    assert_eq!(file.superblock_version(), 2);

    let d = file.find_variable("/g/d").unwrap();
    assert_eq!(file.read_section(d, None).unwrap().as_f32().unwrap(), &[1.0, 2.0, 4.0]);

    let alias = file.find_variable("/alias").unwrap();
    assert_eq!(alias.shape, vec![3]);
    assert_eq!(
        file.read_section(alias, None).unwrap(),
        file.read_section(d, None).unwrap()
    );
    assert!(file.root().variable("dangling").is_none());
}

#[test]
fn soft_link_to_a_group_is_not_walked_twice() {
    let mut w = Writer::new(Superblock::V2);
    let d = w.put(&v2_header(&[
        msg(DATASPACE, dataspace(&[1], None)),
        msg(DATATYPE, u8_type()),
        msg(LAYOUT, compact_layout(&[8])),
    ]));
    let g = v2_group(&mut w, vec![hard_link("d", d)], vec![]);
    let root = v2_group(
        &mut w,
        vec![hard_link("g", g), soft_link("up", "/"), soft_link("again", "/g"), soft_link("leaf", "/g/d")],
        vec![],
    );
    let file = open(w.finish(root));

    let root = file.root();
    let groups: Vec<&str> = root.groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(groups, vec!["g"]);
    assert!(root.find_group("/again").is_none());
    assert!(root.find_group("/up").is_none());
    assert_eq!(file.read_section(file.find_variable("/leaf").unwrap(), None).unwrap().as_u8().unwrap(), &[8]);
}

#[test]
fn symbol_table_soft_links() {
    let mut w = Writer::new(Superblock::V0);
    let v = contiguous(&mut w, &u8_type(), &[2], &[3, 4], vec![]);
    let sub = v0_group(&mut w, &[Entry::Hard("v", v), Entry::Soft("same", "v")], vec![]);
    let root = v0_group(&mut w, &[Entry::Hard("sub", sub)], vec![]);
    let file = open(w.finish(root));

    let same = file.find_variable("/sub/same").unwrap();
    assert_eq!(file.read_section(same, None).unwrap().as_u8().unwrap(), &[3, 4]);
}

#[test]
fn dense_links_in_a_fractal_heap() {
    let mut w = Writer::new(Superblock::V2);
    let a = w.put(&v2_header(&[
        msg(DATASPACE, dataspace(&[1], None)),
        msg(DATATYPE, u8_type()),
        msg(LAYOUT, compact_layout(&[1])),
    ]));
    let b = w.put(&v2_header(&[
        msg(DATASPACE, dataspace(&[1], None)),
        msg(DATATYPE, u8_type()),
        msg(LAYOUT, compact_layout(&[2])),
    ]));
    let root = dense_group(&mut w, &[hard_link("b", b), hard_link("a", a)]);
    let file = Hdf5File::from_bytes(w.finish(root), ReadOptions::default().verify_checksums(true)).unwrap();

    let names: Vec<&str> = file.root().variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    let b = file.find_variable("/b").unwrap();
    assert_eq!(file.read_section(b, None).unwrap().as_u8().unwrap(), &[2]);
}

#[test]
fn group_cycles_and_repeated_links_are_cut() {
    let mut w = Writer::new(Superblock::V2);
    // root -> child -> root; the child's address is patched in afterwards
    let placeholder = hard_link("child", 0);
    let root = v2_group(&mut w, vec![placeholder.clone(), hard_link("extra", 0)], vec![]);
    let child = v2_group(&mut w, vec![hard_link("up", root)], vec![]);
    let first_link = root + 10 + 4;
    w.patch(first_link + placeholder.len() as u64 - 8, &child.to_le_bytes());
    let second_link = first_link + placeholder.len() as u64 + 4;
    w.patch(second_link + hard_link("extra", 0).len() as u64 - 8, &child.to_le_bytes());
    let file = open(w.finish(root));

    let root = file.root();
    assert_eq!(root.groups.len(), 1, "second link to the same group is dropped");
    let child = root.group("child").unwrap();
    assert_eq!(child.path, "/child");
    assert!(child.groups.is_empty(), "link back to the root is dropped");
}

// ---------------------------------------------------------------------------
// Opening from disk
// ---------------------------------------------------------------------------

#[rstest]
#[case::mapped(true)]
#[case::read_whole(false)]
fn open_from_a_path(#[case] mmap: bool) {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&simple_file()).unwrap();
    tmp.flush().unwrap();

    let file = netchdf::open_with(tmp.path(), ReadOptions::default().use_mmap(mmap)).unwrap();
    let temp = file.find_variable("/temp").unwrap();
    assert_eq!(file.read_section(temp, None).unwrap().len(), 6);

    let again = netchdf::open(tmp.path()).unwrap();
    assert_eq!(again.root(), file.root());
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = netchdf::open(dir.path().join("absent.h5")).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}
