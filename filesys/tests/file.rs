mod common;

use common::*;
use filesys::{Error, File, SECTOR_SIZE};

fn open_file(fs: &std::sync::Arc<filesys::FileSystem>, length: usize) -> File {
    let sector = fs.create_file(length as i32).unwrap();
    File::new(fs.open(sector).unwrap())
}

#[test]
fn sequential_io_advances_position() {
    let Fixture { fs, .. } = fixture();
    let mut file = open_file(&fs, 2 * SECTOR_SIZE);

    assert_eq!(file.write(b"hello, "), Ok(7));
    assert_eq!(file.write(b"world"), Ok(5));
    assert_eq!(file.tell(), 12);

    file.seek(0);
    let mut buf = [0; 12];
    assert_eq!(file.read(&mut buf), 12);
    assert_eq!(&buf, b"hello, world");
    assert_eq!(file.tell(), 12);
}

#[test]
fn positional_io_keeps_position() {
    let Fixture { fs, .. } = fixture();
    let mut file = open_file(&fs, SECTOR_SIZE);

    file.seek(100);
    assert_eq!(file.write_at(b"abc", 510), Err(Error::WritePastEnd));
    assert_eq!(file.write_at(b"ab", 510), Ok(2));
    let mut buf = [0; 4];
    assert_eq!(file.read_at(&mut buf, 509), 3);
    assert_eq!(&buf[..3], b"\0ab");
    assert_eq!(file.tell(), 100);
}

#[test]
fn read_all_drains_from_position() {
    let Fixture { fs, .. } = fixture();
    let length = 3 * SECTOR_SIZE + 5;
    let mut file = open_file(&fs, length);

    let content: Vec<u8> = (0..length).map(|i| (i % 7) as u8 + 1).collect();
    assert_eq!(file.write(&content), Ok(length));

    file.seek(SECTOR_SIZE - 1);
    assert_eq!(file.read_all(), content[SECTOR_SIZE - 1..]);
    assert_eq!(file.tell(), length);
    assert!(file.read_all().is_empty());
}

#[test]
fn seeking_past_end_reads_nothing() {
    let Fixture { fs, .. } = fixture();
    let mut file = open_file(&fs, 10);

    file.seek(1000);
    let mut buf = [0; 8];
    assert_eq!(file.read(&mut buf), 0);
    assert_eq!(file.tell(), 1000);
}

#[test]
fn deny_write_lasts_until_the_file_is_dropped() {
    let Fixture { fs, .. } = fixture();
    let mut executable = open_file(&fs, SECTOR_SIZE);
    let mut writer = executable.reopen();

    executable.deny_write();
    // 重复禁止只计一次
    executable.deny_write();
    assert_eq!(writer.write(b"patch"), Ok(0));
    assert_eq!(writer.tell(), 0);

    drop(executable);
    assert_eq!(writer.write(b"patch"), Ok(5));
}

#[test]
fn allow_write_restores_writes() {
    let Fixture { fs, .. } = fixture();
    let mut file = open_file(&fs, SECTOR_SIZE);

    file.deny_write();
    assert_eq!(file.write(b"x"), Ok(0));
    file.allow_write();
    file.allow_write();
    assert_eq!(file.write(b"x"), Ok(1));
}

#[test]
fn reopened_files_share_the_inode() {
    let Fixture { fs, .. } = fixture();
    let file = open_file(&fs, SECTOR_SIZE);
    let other = file.reopen();

    assert!(file.inode().same_inode(other.inode()));
    assert_eq!(file.inode().open_count(), 2);
    assert_eq!(other.tell(), 0);

    drop(file);
    assert_eq!(other.inode().open_count(), 1);
    assert_eq!(fs.open_inodes(), 1);
}
