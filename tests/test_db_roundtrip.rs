// Full pipeline over on-disk tab-delimited databases
use clonedef::airr::{default_output_path, DbFormat, DbReader, DbWriter};
use clonedef::assign::{assign_clones, CloneConfig};
use clonedef::cluster::Linkage;
use clonedef::distance::{DistanceModel, DistanceParams, Normalization, Symmetry};
use clonedef::preclone::{group_records, GroupAction, GroupConfig, GroupMode};
use std::io::Write;
use std::path::Path;

fn write_db(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn cluster_and_rewrite_airr_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = write_db(
        dir.path(),
        "reads.tsv",
        "sequence_id\tv_call\tj_call\tjunction\tduplicate_count\n\
         S1\tIGHV1-2*01\tIGHJ4*01\tTGTGCACGAACTAG\t4\n\
         S2\tIGHV1-2*02\tIGHJ4*01\tTGTGCACGAACTAT\t2\n\
         S3\tIGHV3-7*01\tIGHJ4*01\tTGTGCACGATTTAG\t1\n\
         S4\tIGHV1-2*01\tIGHJ4*01\tTGTGNNNNACTAG\t1\n",
    );

    let mut reader = DbReader::from_path(&db).unwrap();
    reader
        .check_fields(&["sequence_id", "v_call", "j_call", "junction"])
        .unwrap();
    let columns = reader.columns.clone();
    let mut records = reader.read_all().unwrap();
    assert_eq!(records.len(), 4);

    let group = GroupConfig {
        v_field: "v_call".to_string(),
        j_field: "j_call".to_string(),
        seq_field: "junction".to_string(),
        group_fields: vec![],
        mode: GroupMode::Gene,
        action: GroupAction::First,
    };
    let clone = CloneConfig {
        seq_field: "junction".to_string(),
        max_missing: 0,
        params: DistanceParams::new(
            DistanceModel::Ham,
            Normalization::Len,
            Symmetry::Avg,
            None,
        )
        .unwrap(),
        linkage: Linkage::Single,
        threshold: 0.1,
    };

    let index = group_records(&records, &group);
    let summary = assign_clones(&mut records, &index, &clone).unwrap();
    // S1+S2 cluster, S3 is its own preclone, S4 fails the missing filter
    assert_eq!(summary.clone_count, 2);
    assert_eq!(summary.pass_records, 3);
    assert_eq!(summary.fail_records, 1);

    let pass_path = default_output_path(&db, "pass");
    assert_eq!(pass_path.file_name().unwrap(), "reads_clone-pass.tsv");
    let mut writer = DbWriter::create(&pass_path, &columns, DbFormat::Airr).unwrap();
    for rec in records.iter().filter(|r| r.clone_id.is_some()) {
        writer.write_record(rec).unwrap();
    }
    writer.finish().unwrap();

    let text = std::fs::read_to_string(&pass_path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "sequence_id\tv_call\tj_call\tjunction\tduplicate_count\tclone_id"
    );
    assert_eq!(lines.len(), 4);
    // Annotation columns survive untouched, clone label appended
    assert!(lines[1].starts_with("S1\tIGHV1-2*01\tIGHJ4*01\tTGTGCACGAACTAG\t4\t"));

    // S1 and S2 carry the same clone label
    let label = |line: &str| line.rsplit('\t').next().unwrap().to_string();
    assert_eq!(label(lines[1]), label(lines[2]));
}

#[test]
fn changeo_schema_uses_legacy_columns() {
    let dir = tempfile::tempdir().unwrap();
    let db = write_db(
        dir.path(),
        "reads.tab",
        "SEQUENCE_ID\tV_CALL\tJ_CALL\tJUNCTION\n\
         S1\tIGHV1-2*01\tIGHJ4*01\tTGTGCACGAACTAG\n",
    );

    let mut reader = DbReader::from_path(&db).unwrap();
    let fmt = DbFormat::Changeo;
    reader
        .check_fields(&[fmt.id_field(), fmt.v_field(), fmt.j_field(), fmt.seq_field()])
        .unwrap();
    let mut records = reader.read_all().unwrap();
    records[0].clone_id = Some(1);

    let mut out = Vec::new();
    let mut writer = DbWriter::new(&mut out, &reader.columns, fmt).unwrap();
    writer.write_record(&records[0]).unwrap();
    writer.finish().unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("SEQUENCE_ID\tV_CALL\tJ_CALL\tJUNCTION\tCLONE\n"));
}

#[test]
fn empty_database_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let db = write_db(dir.path(), "empty.tsv", "");
    assert!(DbReader::from_path(&db).is_err());
}
