//! Growing-field and can-fail scenarios against the in-memory backend.

use approx::assert_relative_eq;
use nxswriter_core::{DataFormat, DataHolder, Dim, Error, Slice, TypeCode, Value};
use nxswriter_engine::{
    CompressionConfig, EntryLayout, FieldConfig, FieldWriter, NexusWriter, StepOutcome, StepRecord,
    StepState, Strategy, WriterConfig,
};
use nxswriter_io::{
    create_file, open_file, Deflate, File, Group, LibVersion, MemoryBackend, Node,
};
use std::sync::Arc;

struct Session {
    _file: File<MemoryBackend>,
    entry: Group<MemoryBackend>,
}

fn session(name: &str) -> Session {
    let backend = Arc::new(MemoryBackend::new());
    let file = create_file(&backend, name, false).unwrap();
    let entry = file.root().unwrap().create_group("entry", "NXentry").unwrap();
    Session { _file: file, entry }
}

fn writer(session: &Session, config: FieldConfig, canfail: bool) -> FieldWriter<MemoryBackend> {
    FieldWriter::create(&session.entry, config, canfail, Deflate::default()).unwrap()
}

fn frame(rows: usize, cols: usize, base: i32) -> (DataHolder, Vec<i32>) {
    let total = i32::try_from(rows * cols).unwrap();
    let values: Vec<i32> = (0..total).map(|i| base + i).collect();
    let value = Value::from_shape_vec(&[rows, cols], values.clone()).unwrap();
    (DataHolder::new(DataFormat::Image, value).unwrap(), values)
}

#[test]
fn test_scalar_steps() {
    let session = session("scalar.nxs");
    let mut energy = writer(&session, FieldConfig::step("energy", "NX_FLOAT64", "mono"), false);
    assert!(energy.is_growing());
    assert_eq!(energy.grows(), Some(1));

    for value in [0.1f64, 0.2] {
        let outcome = energy.record(Ok(&DataHolder::scalar(value))).unwrap();
        assert_eq!(outcome, StepOutcome::Written);
    }
    assert_eq!(energy.state(), StepState::Written);

    let field = energy.field();
    assert_eq!(field.shape().unwrap(), vec![2]);
    assert_eq!(field.dtype().unwrap(), TypeCode::Float64);
    let values = field.read().unwrap().to_vec::<f64>().unwrap();
    assert_relative_eq!(values[0], 0.1);
    assert_relative_eq!(values[1], 0.2);
}

#[test]
fn test_spectrum_steps() {
    let session = session("spectrum.nxs");
    let config = FieldConfig::step("counts", "NX_UINT32", "mca").with_shape(&[2048]);
    let mut counts = writer(&session, config, false);

    for step in 0..2u32 {
        let spectrum: Vec<u32> = (0..2048).map(|i| i + step * 10_000).collect();
        counts.record(Ok(&DataHolder::spectrum(spectrum))).unwrap();
    }

    let field = counts.field();
    assert_eq!(field.shape().unwrap(), vec![2, 2048]);
    let second = field
        .read_slice(&Slice::dims(vec![Dim::Index(1), Dim::Full]))
        .unwrap()
        .to_vec::<u32>()
        .unwrap();
    assert_eq!(second[0], 10_000);
    assert_eq!(second[2047], 12_047);
}

#[test]
fn test_image_steps() {
    let session = session("image.nxs");
    let config = FieldConfig::step("data", "NX_INT32", "ccd")
        .with_shape(&[100, 200])
        .with_grows(1);
    let mut data = writer(&session, config, false);

    let (first, _) = frame(100, 200, 0);
    let (second, expected) = frame(100, 200, 1_000_000);
    data.record(Ok(&first)).unwrap();
    data.record(Ok(&second)).unwrap();

    let field = data.field();
    assert_eq!(field.shape().unwrap(), vec![2, 100, 200]);
    let stored = field
        .read_slice(&Slice::dims(vec![Dim::Index(1), Dim::Full, Dim::Full]))
        .unwrap();
    assert_eq!(stored.to_vec::<i32>().unwrap(), expected);
}

#[test]
fn test_image_growth_axes() {
    let cases = [
        (1, vec![2, 3, 4], vec![Dim::Index(1), Dim::Full, Dim::Full]),
        (2, vec![3, 2, 4], vec![Dim::Full, Dim::Index(1), Dim::Full]),
        (3, vec![3, 4, 2], vec![Dim::Full, Dim::Full, Dim::Index(1)]),
    ];
    for (grows, shape, newest) in cases {
        let session = session(&format!("grows{grows}.nxs"));
        let config = FieldConfig::step("data", "NX_INT32", "ccd")
            .with_shape(&[3, 4])
            .with_grows(grows);
        let mut data = writer(&session, config, false);
        assert_eq!(data.grows(), Some(grows));

        let (first, _) = frame(3, 4, 0);
        let (second, expected) = frame(3, 4, 100);
        data.record(Ok(&first)).unwrap();
        data.record(Ok(&second)).unwrap();

        let field = data.field();
        assert_eq!(field.shape().unwrap(), shape, "grows={grows}");
        let stored = field.read_slice(&Slice::dims(newest)).unwrap();
        assert_eq!(stored.to_vec::<i32>().unwrap(), expected, "grows={grows}");
    }
}

#[test]
fn test_spectrum_growth_axis_two() {
    let session = session("columns.nxs");
    let config = FieldConfig::step("trace", "NX_FLOAT32", "scope")
        .with_shape(&[3])
        .with_grows(2);
    let mut trace = writer(&session, config, false);
    trace.record(Ok(&DataHolder::spectrum(vec![1.0f32, 2.0, 3.0]))).unwrap();
    trace.record(Ok(&DataHolder::spectrum(vec![4.0f32, 5.0, 6.0]))).unwrap();

    let field = trace.field();
    assert_eq!(field.shape().unwrap(), vec![3, 2]);
    let column = field
        .read_slice(&Slice::dims(vec![Dim::Full, Dim::Index(1)]))
        .unwrap()
        .to_vec::<f32>()
        .unwrap();
    assert_eq!(column, vec![4.0, 5.0, 6.0]);
}

#[test]
fn test_unknown_extent_only_grows() {
    let session = session("monotonic.nxs");
    let config = FieldConfig::step("peaks", "NX_INT32", "fit").with_shape(&[0]);
    let mut peaks = writer(&session, config, false);

    let mut widths = Vec::new();
    for len in [3, 5, 2] {
        let values: Vec<i32> = (1..=len).collect();
        peaks.record(Ok(&DataHolder::spectrum(values))).unwrap();
        widths.push(peaks.field().shape().unwrap()[1]);
    }
    assert_eq!(widths, vec![3, 5, 5]);
    assert_eq!(peaks.field().shape().unwrap(), vec![3, 5]);

    let first = peaks
        .field()
        .read_slice(&Slice::dims(vec![Dim::Index(0), Dim::Full]))
        .unwrap()
        .to_vec::<i32>()
        .unwrap();
    assert_eq!(first, vec![1, 2, 3, 0, 0]);
}

#[test]
fn test_degenerate_image_into_spectrum() {
    let session = session("degenerate.nxs");
    let config = FieldConfig::step("row", "NX_INT32", "line").with_shape(&[4]);
    let mut row = writer(&session, config, false);
    let (image, expected) = frame(1, 4, 7);
    row.record(Ok(&image)).unwrap();
    assert_eq!(row.field().shape().unwrap(), vec![1, 4]);
    assert_eq!(row.field().read().unwrap().to_vec::<i32>().unwrap(), expected);

    let (square, _) = frame(2, 2, 0);
    let err = row.record(Ok(&square)).unwrap_err();
    assert!(matches!(err, Error::RankMismatch(_)));
    assert_eq!(row.state(), StepState::Failed);
}

#[test]
fn test_growing_rank_is_bounded() {
    let session = session("rank.nxs");
    let config = FieldConfig::step("cube", "NX_INT32", "tomo").with_shape(&[2, 3, 4]);
    let err = FieldWriter::create(&session.entry, config, false, Deflate::default())
        .err()
        .unwrap();
    assert!(matches!(err, Error::ObjectCreate { kind: "field", .. }));

    let err = FieldWriter::create(
        &session.entry,
        FieldConfig::step("bad", "NX_COMPLEX", "x"),
        false,
        Deflate::default(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, Error::UnsupportedType(_)));
}

#[test]
fn test_canfail_fills_missing_step() {
    let session = session("canfail.nxs");
    let config = FieldConfig::step("counts", "NX_INT32", "mca").with_shape(&[4]);
    let mut counts = writer(&session, config, true);
    assert!(counts.canfail());
    // full declared extent up front
    assert_eq!(counts.field().shape().unwrap(), vec![0, 4]);

    counts.record(Ok(&DataHolder::spectrum(vec![1i32, 2, 3, 4]))).unwrap();
    let outcome = counts
        .record(Err(Error::DataUnavailable("mca offline".to_string())))
        .unwrap();
    assert_eq!(outcome, StepOutcome::SentinelFilled);
    assert_eq!(counts.state(), StepState::SentinelFilled);
    counts.record(Ok(&DataHolder::spectrum(vec![5i32, 6, 7, 8]))).unwrap();

    let field = counts.field();
    assert_eq!(field.shape().unwrap(), vec![3, 4]);
    let values = field.read().unwrap().to_vec::<i32>().unwrap();
    assert_eq!(&values[4..8], &[i32::MAX; 4]);
    assert_eq!(&values[8..], &[5, 6, 7, 8]);

    let attrs = field.attributes().unwrap();
    assert_eq!(attrs.read_str("nexdatas_canfail").unwrap().as_deref(), Some("FAILED"));
    let log = attrs.read_str("nexdatas_canfail_error").unwrap().unwrap();
    assert!(log.contains("mca offline"));
}

#[test]
fn test_canfail_errors_accumulate() {
    let session = session("errors.nxs");
    let mut energy = writer(&session, FieldConfig::step("energy", "NX_FLOAT64", "mono"), true);

    energy
        .record(Err(Error::DataUnavailable("first".to_string())))
        .unwrap();
    // an unconvertible payload fails after the slot was added; it is reused
    energy
        .record(Ok(&DataHolder::scalar("n/a".to_string())))
        .unwrap();

    let field = energy.field();
    assert_eq!(field.shape().unwrap(), vec![2]);
    let values = field.read().unwrap().to_vec::<f64>().unwrap();
    assert_relative_eq!(values[0], f64::MAX);
    assert_relative_eq!(values[1], f64::MAX);

    let log = field
        .attributes()
        .unwrap()
        .read_str("nexdatas_canfail_error")
        .unwrap()
        .unwrap();
    assert_eq!(log.lines().count(), 2);
    assert!(log.lines().next().unwrap().contains("first"));
}

#[test]
fn test_missing_data_without_canfail() {
    let session = session("strict.nxs");
    let config = FieldConfig::step("counts", "NX_UINT16", "mca").with_shape(&[8]);
    let mut counts = writer(&session, config, false);
    counts.record(Ok(&DataHolder::spectrum(vec![1u16; 8]))).unwrap();

    let err = counts
        .record(Err(Error::DataUnavailable("mca offline".to_string())))
        .unwrap_err();
    assert!(matches!(err, Error::DataUnavailable(_)));
    assert_eq!(counts.state(), StepState::Failed);

    let field = counts.field();
    assert_eq!(field.shape().unwrap(), vec![1, 8]);
    assert_eq!(field.attributes().unwrap().read_str("nexdatas_canfail").unwrap(), None);
}

#[test]
fn test_sentinel_types() {
    let session = session("sentinels.nxs");
    let cases = [
        ("flag", "NX_BOOLEAN"),
        ("label", "NX_CHAR"),
        ("count", "NX_UINT64"),
        ("half", "float16"),
    ];
    let mut writers: Vec<_> = cases
        .iter()
        .map(|(name, dtype)| writer(&session, FieldConfig::step(name, dtype, name), true))
        .collect();
    for writer in &mut writers {
        writer
            .record(Err(Error::DataUnavailable("gone".to_string())))
            .unwrap();
    }

    let flag = writers[0].field().read().unwrap();
    assert_eq!(flag.to_vec::<bool>().unwrap(), vec![false]);
    let label = writers[1].field().read().unwrap();
    assert_eq!(label.to_vec::<String>().unwrap(), vec![String::new()]);
    let count = writers[2].field().read().unwrap();
    assert_eq!(count.to_vec::<u64>().unwrap(), vec![i64::MAX as u64]);
    let half = writers[3].field().read().unwrap();
    assert_relative_eq!(half.to_vec::<f32>().unwrap()[0], 65504.0);
}

#[test]
fn test_standard_attributes_and_compression() {
    let session = session("attributes.nxs");
    let config = FieldConfig::step("energy", "NX_FLOAT64", "mono")
        .with_units("keV")
        .with_compression(CompressionConfig {
            rate: Some(2),
            shuffle: None,
        });
    let defaults = Deflate::new(5, false).unwrap();
    let energy = FieldWriter::create(&session.entry, config, false, defaults).unwrap();

    let field = energy.field();
    assert_eq!(field.filter().unwrap(), Some(Deflate::new(2, false).unwrap()));
    assert_eq!(field.chunk().unwrap(), Some(vec![1]));
    let attrs = field.attributes().unwrap();
    assert_eq!(attrs.read_str("type").unwrap().as_deref(), Some("NX_FLOAT64"));
    assert_eq!(attrs.read_str("units").unwrap().as_deref(), Some("keV"));
    assert_eq!(attrs.read_str("nexdatas_strategy").unwrap().as_deref(), Some("STEP"));
    assert_eq!(attrs.read_str("nexdatas_source").unwrap().as_deref(), Some("mono"));
    assert_eq!(attrs.read_str("postrun").unwrap(), None);

    let mut postrun = FieldConfig::new("raw", "NX_CHAR").with_strategy(Strategy::Postrun);
    postrun.postrun = Some(" file:///data/raw_%05d.cbf:0:10 ".to_string());
    let raw = writer(&session, postrun, false);
    let attrs = raw.field().attributes().unwrap();
    assert_eq!(
        attrs.read_str("postrun").unwrap().as_deref(),
        Some("file:///data/raw_%05d.cbf:0:10")
    );
    assert_eq!(raw.field().filter().unwrap(), None);
}

#[test]
fn test_static_content() {
    let session = session("content.nxs");
    let title = writer(&session, FieldConfig::new("title", "NX_CHAR").with_content("  calibration \n"), false);
    assert_eq!(
        title.field().read().unwrap().to_vec::<String>().unwrap(),
        vec!["calibration".to_string()]
    );

    let offsets = FieldConfig::new("offsets", "NX_INT16")
        .with_shape(&[3])
        .with_content("4 -5\t6");
    let offsets = writer(&session, offsets, false);
    assert_eq!(offsets.field().shape().unwrap(), vec![3]);
    assert_eq!(offsets.field().read().unwrap().to_vec::<i16>().unwrap(), vec![4, -5, 6]);

    let matrix = FieldConfig::new("matrix", "NX_FLOAT64")
        .with_shape(&[2, 2])
        .with_content("1 0\n0 1");
    let matrix = writer(&session, matrix, false);
    assert_eq!(matrix.field().shape().unwrap(), vec![2, 2]);
    let values = matrix.field().read().unwrap().to_vec::<f64>().unwrap();
    assert_relative_eq!(values[3], 1.0);

    let err = FieldWriter::create(
        &session.entry,
        FieldConfig::new("distance", "NX_FLOAT64"),
        false,
        Deflate::default(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, Error::DataUnavailable(_)));
    // strings may stay empty
    writer(&session, FieldConfig::new("comment", "NX_CHAR"), false);
}

const LAYOUT: &str = r#"{
    "groups": [{
        "name": "instrument",
        "nxclass": "NXinstrument",
        "groups": [{
            "name": "detector",
            "nxclass": "NXdetector",
            "fields": [
                {"name": "data", "type": "NX_INT32", "strategy": "STEP",
                 "source": "ccd", "shape": [2, 3]},
                {"name": "exposure", "type": "NX_FLOAT64", "units": "s",
                 "strategy": "INIT", "source": "exposure"}
            ]
        }]
    }],
    "fields": [
        {"name": "title", "type": "NX_CHAR", "content": "test scan"},
        {"name": "energy", "type": "NX_FLOAT64", "strategy": "STEP",
         "source": "mono", "canfail": true},
        {"name": "end_time", "type": "NX_DATE_TIME", "strategy": "FINAL",
         "source": "clock"}
    ],
    "links": [{"name": "data", "target": "/entry/instrument/detector/data"}]
}"#;

#[test]
fn test_writer_session() {
    let backend = Arc::new(MemoryBackend::new());
    let layout = EntryLayout::from_json(LAYOUT).unwrap();
    let mut writer = NexusWriter::new(Arc::clone(&backend), WriterConfig::default());
    writer.open_file("scan.nxs").unwrap();

    let mut init = StepRecord::new();
    init.insert("exposure", DataHolder::scalar(0.5f64));
    let report = writer.open_entry(&layout, &init).unwrap();
    assert_eq!(report.written, 1);
    assert_eq!(writer.fields().len(), 5);

    for step in 0..3 {
        let mut record = StepRecord::new();
        let (image, _) = frame(2, 3, step * 10);
        record.insert("ccd", image);
        if step != 1 {
            record.insert("mono", DataHolder::scalar(12.0 + f64::from(step)));
        }
        let report = writer.record(&record).unwrap();
        assert_eq!(report.step, usize::try_from(step + 1).unwrap());
        if step == 1 {
            assert_eq!(report.written, 1);
            assert_eq!(report.failed, vec!["/entry/energy".to_string()]);
        } else {
            assert_eq!(report.written, 2);
        }
    }
    assert_eq!(writer.steps(), 3);

    let mut last = StepRecord::new();
    last.insert("clock", DataHolder::scalar("2026-10-18T12:00:00".to_string()));
    writer.close_entry(&last).unwrap();
    writer.close_file().unwrap();
    assert!(writer.file().is_none());

    let file = open_file(&backend, "scan.nxs", true).unwrap();
    let root = file.root().unwrap();
    let attrs = root.attributes().unwrap();
    assert_eq!(attrs.read_str("NX_class").unwrap().as_deref(), Some("NXroot"));
    assert_eq!(attrs.read_str("file_name").unwrap().as_deref(), Some("scan.nxs"));

    let entry = root.open("entry").unwrap().into_group().unwrap();
    assert_eq!(
        entry.attributes().unwrap().read_str("NX_class").unwrap().as_deref(),
        Some("NXentry")
    );
    let data = entry.open("data").unwrap().into_field().unwrap();
    assert_eq!(data.shape().unwrap(), vec![3, 2, 3]);

    let energy = entry.open("energy").unwrap().into_field().unwrap();
    let values = energy.read().unwrap().to_vec::<f64>().unwrap();
    assert_relative_eq!(values[0], 12.0);
    assert_relative_eq!(values[1], f64::MAX);
    assert_relative_eq!(values[2], 14.0);

    let end = entry.open("end_time").unwrap().into_field().unwrap();
    assert_eq!(
        end.read().unwrap().to_vec::<String>().unwrap(),
        vec!["2026-10-18T12:00:00".to_string()]
    );
    let title = entry.open("title").unwrap().into_field().unwrap();
    assert_eq!(title.read().unwrap().to_vec::<String>().unwrap(), vec!["test scan".to_string()]);
}

#[test]
fn test_writer_strict_step_aborts() {
    let backend = Arc::new(MemoryBackend::new());
    let layout = EntryLayout::from_json(
        r#"{"fields": [
            {"name": "counter", "type": "NX_UINT32", "strategy": "STEP", "source": "count"},
            {"name": "energy", "type": "NX_FLOAT64", "strategy": "STEP", "source": "mono"}
        ]}"#,
    )
    .unwrap();
    let mut writer = NexusWriter::new(Arc::clone(&backend), WriterConfig::default());
    assert!(matches!(writer.record(&StepRecord::new()), Err(Error::StaleHandle(_))));

    writer.open_file("strict.nxs").unwrap();
    writer.open_entry(&layout, &StepRecord::new()).unwrap();
    let mut record = StepRecord::new();
    record.insert("count", DataHolder::scalar(7u32));
    record.insert("mono", DataHolder::scalar(12.0f64));
    writer.record(&record).unwrap();
    assert_eq!(writer.steps(), 1);

    let mut gap = StepRecord::new();
    gap.insert("count", DataHolder::scalar(8u32));
    let err = writer.record(&gap).unwrap_err();
    assert!(matches!(err, Error::DataUnavailable(_)));
    assert_eq!(writer.steps(), 1);
    let fields = writer.fields();
    assert_eq!(fields[0].field().shape().unwrap(), vec![2]);
    assert_eq!(fields[1].field().shape().unwrap(), vec![1]);
    assert_eq!(fields[1].state(), StepState::Failed);

    // the session flag turns the same gap into a sentinel
    writer.set_canfail(Some(true));
    writer.open_entry(
        &EntryLayout {
            name: "entry2".to_string(),
            ..layout
        },
        &StepRecord::new(),
    )
    .unwrap();
    let report = writer.record(&gap).unwrap();
    assert_eq!(report.written, 1);
    assert_eq!(report.failed, vec!["/entry2/energy".to_string()]);
    assert_eq!(writer.steps(), 1);
}

#[test]
fn test_writer_file_format_from_config() {
    let backend = Arc::new(MemoryBackend::new());
    let mut writer = NexusWriter::new(Arc::clone(&backend), WriterConfig::default());
    writer.open_file("earliest.nxs").unwrap();
    assert_eq!(writer.file().unwrap().libver().unwrap(), LibVersion::Earliest);

    let config = WriterConfig::from_json(r#"{"libver": "latest"}"#).unwrap();
    let mut writer = NexusWriter::new(Arc::clone(&backend), config);
    writer.open_file("latest.nxs").unwrap();
    assert_eq!(writer.file().unwrap().libver().unwrap(), LibVersion::Latest);
    writer.reopen(false, false).unwrap();
    assert_eq!(writer.file().unwrap().libver().unwrap(), LibVersion::Latest);
}

#[test]
fn test_writer_reopen_keeps_fields_bound() {
    let backend = Arc::new(MemoryBackend::new());
    let layout = EntryLayout::from_json(
        r#"{"fields": [{"name": "energy", "type": "NX_FLOAT64", "strategy": "STEP", "source": "mono"}]}"#,
    )
    .unwrap();
    let mut writer = NexusWriter::new(Arc::clone(&backend), WriterConfig::default());
    writer.open_file("reopen.nxs").unwrap();
    writer.open_entry(&layout, &StepRecord::new()).unwrap();

    let mut record = StepRecord::new();
    record.insert("mono", DataHolder::scalar(1.5f64));
    writer.record(&record).unwrap();

    writer.reopen(true, false).unwrap();
    assert!(matches!(writer.record(&record), Err(Error::ReadOnly(_))));
    writer.reopen(false, false).unwrap();
    writer.record(&record).unwrap();
    assert!(writer.fields()[0].field().is_valid());
}

#[cfg(feature = "hdf5")]
#[test]
fn test_hdf5_session() {
    use nxswriter_io::Hdf5Backend;
    use tempfile::tempdir;

    let dir = tempdir().unwrap();
    let path = dir.path().join("scan.h5");
    let backend = Arc::new(Hdf5Backend::new());
    let layout = EntryLayout::from_json(
        r#"{"fields": [
            {"name": "counts", "type": "NX_UINT32", "strategy": "STEP",
             "source": "mca", "shape": [0], "canfail": true, "compression": {}},
            {"name": "gain", "type": "float16", "strategy": "STEP",
             "source": "gain", "canfail": true}
        ]}"#,
    )
    .unwrap();
    let config = WriterConfig::from_json(r#"{"libver": "latest"}"#).unwrap();
    let mut writer = NexusWriter::new(Arc::clone(&backend), config);
    writer.open_file(&path).unwrap();
    assert_eq!(writer.file().unwrap().libver().unwrap(), LibVersion::Latest);
    writer.open_entry(&layout, &StepRecord::new()).unwrap();

    let mut record = StepRecord::new();
    record.insert("mca", DataHolder::spectrum(vec![1u32, 2, 3]));
    record.insert("gain", DataHolder::scalar(1.5f32));
    writer.record(&record).unwrap();
    writer.record(&StepRecord::new()).unwrap();
    writer.close_entry(&StepRecord::new()).unwrap();
    writer.close_file().unwrap();

    let file = open_file(&backend, &path, true).unwrap();
    let counts = file
        .root()
        .unwrap()
        .open("entry")
        .unwrap()
        .into_group()
        .unwrap()
        .open("counts")
        .unwrap()
        .into_field()
        .unwrap();
    assert_eq!(counts.shape().unwrap(), vec![2, 3]);
    assert_eq!(
        counts.read().unwrap().to_vec::<u32>().unwrap(),
        vec![1, 2, 3, u32::MAX, u32::MAX, u32::MAX]
    );
    assert_eq!(counts.filter().unwrap(), Some(Deflate::default()));

    let gain = file
        .root()
        .unwrap()
        .open("entry")
        .unwrap()
        .into_group()
        .unwrap()
        .open("gain")
        .unwrap()
        .into_field()
        .unwrap();
    assert_eq!(gain.dtype().unwrap(), TypeCode::Float16);
    let values = gain.read().unwrap().to_vec::<f32>().unwrap();
    assert_relative_eq!(values[0], 1.5);
    assert_relative_eq!(values[1], 65504.0);
}
