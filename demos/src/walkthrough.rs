use std::env;
use std::fs::OpenOptions;

use shallowfs::io::DiskImageBuilder;
use shallowfs::ShallowFs;

/// Formats a small image and walks the whole operation surface once:
/// mkdir, mknod, getattr, readdir.
pub fn main() {
    let path = env::args()
        .nth(1)
        .unwrap_or_else(|| "shallow.img".to_string());

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .expect("could not create image file");
    let dev = DiskImageBuilder::from(file)
        .with_block_count(64)
        .build()
        .expect("could not prepare image");

    let mut fs = ShallowFs::format(dev).expect("format failed");
    fs.mkdir("/docs").expect("mkdir failed");
    fs.mknod("/docs/readme.txt").expect("mknod failed");

    let attr = fs.getattr("/docs/readme.txt").expect("getattr failed");
    println!("{}: formatted 64 blocks", path);
    println!("/docs/readme.txt: mode {:o}, {} bytes", attr.mode, attr.size);

    print!("/docs:");
    fs.readdir("/docs", |name| print!(" {}", name))
        .expect("readdir failed");
    println!();
}
