use zedit::zfile::{
    AlignmentRule, AlignmentRules, CompressionMethod, Error, StoredEntry, ZFile, ZFileOptions,
};

fn so_rules(rule: AlignmentRule) -> ZFileOptions {
    ZFileOptions::default().with_alignment_rules(AlignmentRules::new().with_rule(rule))
}

fn data_start(entry: &StoredEntry) -> u64 {
    entry.header().offset().unwrap() + entry.local_header_size()
}

#[test]
fn test_stored_entry_is_aligned() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aligned.zip");
    let options = so_rules(AlignmentRule::new("*.so", 4096).unwrap());

    let mut zip = ZFile::open_with_options(&path, options.clone()).unwrap();
    zip.add_bytes("a.txt", b"hello".to_vec(), CompressionMethod::Store)
        .unwrap();
    zip.add_bytes("lib/x.so", vec![1u8; 10], CompressionMethod::Store)
        .unwrap();
    zip.update().unwrap();
    assert_eq!(data_start(zip.get("lib/x.so").unwrap()) % 4096, 0);
    zip.close().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes[40..4058].iter().all(|&b| b == 0));

    let mut zip = ZFile::open_with_options(&path, options).unwrap();
    assert_eq!(zip.read("lib/x.so").unwrap(), vec![1u8; 10]);
    assert!(!zip.realign("lib/x.so").unwrap());
    assert!(!zip.realign_all().unwrap());
    assert!(!zip.is_dirty());
}

#[test]
fn test_compressed_entries_not_aligned_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let data = "y".repeat(5000).into_bytes();

    let options = so_rules(AlignmentRule::new("*.so", 4096).unwrap());
    let mut zip = ZFile::open_with_options(dir.path().join("a.zip"), options).unwrap();
    zip.add_bytes("lib/y.so", data.clone(), CompressionMethod::Deflate)
        .unwrap();
    zip.update().unwrap();
    let entry = zip.get("lib/y.so").unwrap();
    assert_eq!(entry.header().method(), CompressionMethod::Deflate);
    assert_eq!(data_start(entry), 38);
    zip.close().unwrap();

    let options = so_rules(AlignmentRule::new("*.so", 4096).unwrap().for_all_files());
    let mut zip = ZFile::open_with_options(dir.path().join("b.zip"), options).unwrap();
    zip.add_bytes("lib/y.so", data, CompressionMethod::Deflate)
        .unwrap();
    zip.update().unwrap();
    assert_eq!(data_start(zip.get("lib/y.so").unwrap()) % 4096, 0);
    zip.close().unwrap();
}

#[test]
fn test_realign_moves_written_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("realign.zip");

    let mut zip = ZFile::open(&path).unwrap();
    zip.add_bytes("a.txt", b"hello".to_vec(), CompressionMethod::Store)
        .unwrap();
    zip.add_bytes("lib/x.so", vec![7u8; 10], CompressionMethod::Store)
        .unwrap();
    zip.close().unwrap();

    let options = so_rules(AlignmentRule::new("*.so", 4096).unwrap());
    let mut zip = ZFile::open_with_options(&path, options.clone()).unwrap();
    assert_eq!(data_start(zip.get("lib/x.so").unwrap()), 78);

    assert!(zip.realign("lib/x.so").unwrap());
    assert!(zip.is_dirty());
    assert_eq!(zip.get("lib/x.so").unwrap().header().offset(), None);
    assert_eq!(zip.read("lib/x.so").unwrap(), vec![7u8; 10]);
    zip.update().unwrap();
    assert_eq!(data_start(zip.get("lib/x.so").unwrap()) % 4096, 0);
    assert!(!zip.realign_all().unwrap());
    zip.close().unwrap();

    let zip = ZFile::open_with_options(&path, options).unwrap();
    assert_eq!(zip.read("lib/x.so").unwrap(), vec![7u8; 10]);
    assert_eq!(zip.read("a.txt").unwrap(), b"hello");
}

#[test]
fn test_first_matching_rule_wins() {
    let rules: AlignmentRules = [
        AlignmentRule::new("lib/*.so", 16384).unwrap(),
        AlignmentRule::new("*.so", 4096).unwrap(),
    ]
    .into_iter()
    .collect();

    assert_eq!(rules.alignment("lib/a.so", false), 16384);
    assert_eq!(rules.alignment("assets/a.so", false), 4096);
    assert_eq!(rules.alignment("a.txt", false), 1);
    assert_eq!(rules.alignment("lib/a.so", true), 1);
}

#[test]
fn test_invalid_rules() {
    assert!(matches!(
        AlignmentRule::new("*.so", 3),
        Err(Error::InvalidAlignment(3))
    ));
    assert!(matches!(
        AlignmentRule::new("[", 4),
        Err(Error::InvalidPattern(_))
    ));
}

#[test]
fn test_missing_entry() {
    let dir = tempfile::tempdir().unwrap();
    let mut zip = ZFile::open(dir.path().join("none.zip")).unwrap();
    assert!(matches!(zip.realign("nope"), Err(Error::EntryNotFound(_))));
    zip.close().unwrap();
}
