use tempfile::NamedTempFile;

use shallowfs::io::{BlockStorage, DiskImage, DiskImageBuilder};
use shallowfs::ShallowFs;

fn collect_listing(fs: &mut ShallowFs<DiskImage>, path: &str) -> Vec<String> {
    let mut names = Vec::new();
    fs.readdir(path, |name| names.push(name.to_string()))
        .unwrap();
    names
}

#[test]
fn formats_and_walks_a_two_level_tree() {
    let tf = NamedTempFile::new().unwrap();
    let dev = DiskImageBuilder::from(tf.reopen().unwrap())
        .with_block_count(64)
        .build()
        .unwrap();

    let mut fs = ShallowFs::format(dev).unwrap();
    fs.mkdir("/docs").unwrap();
    fs.mknod("/docs/readme.txt").unwrap();

    let attr = fs.getattr("/docs/readme.txt").unwrap();
    assert!(!attr.is_directory());
    assert_eq!(attr.size, 0);

    assert_eq!(collect_listing(&mut fs, "/docs"), vec![".", "..", "readme"]);
}

#[test]
fn tree_survives_a_remount() {
    let tf = NamedTempFile::new().unwrap();
    let dev = DiskImageBuilder::from(tf.reopen().unwrap())
        .with_block_count(64)
        .build()
        .unwrap();

    let mut fs = ShallowFs::format(dev).unwrap();
    fs.mkdir("/docs").unwrap();
    fs.mkdir("/music").unwrap();
    fs.mknod("/docs/notes.txt").unwrap();
    drop(fs);

    let dev = DiskImage::open_disk(tf.path()).unwrap();
    let mut fs = ShallowFs::mount(dev).unwrap();

    assert_eq!(collect_listing(&mut fs, "/"), vec![".", "..", "docs", "music"]);
    assert!(fs.getattr("/music").unwrap().is_directory());
    assert_eq!(fs.getattr("/docs/notes.txt").unwrap().size, 0);
}

#[test]
fn mounting_an_unformatted_image_fails() {
    let tf = NamedTempFile::new().unwrap();
    tf.as_file().set_len(64 * 512).unwrap();

    // Fill the root block with garbage so the count is out of range.
    let mut dev = DiskImage::open_disk(tf.path()).unwrap();
    dev.write_block(0, &[0xFF; 512]).unwrap();

    assert!(ShallowFs::mount(dev).is_err());
}
