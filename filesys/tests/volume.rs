mod common;

use std::sync::Arc;

use common::*;
use filesys::{Bitmap, Error, FileSystem, FreeMap, SECTOR_SIZE, SectorCache, SectorId};

fn bitmap(area_len: usize) -> Bitmap {
    let cache = Arc::new(SectorCache::new(RamDisk::new()));
    let bitmap = Bitmap::new(cache, SectorId::new(1), 1, SectorId::new(2), area_len);
    bitmap.format();
    bitmap
}

#[test]
fn bitmap_hands_out_first_fit_runs() {
    let bitmap = bitmap(100);

    assert_eq!(bitmap.allocate(1), Some(SectorId::new(2)));
    assert_eq!(bitmap.allocate(3), Some(SectorId::new(3)));
    bitmap.release(SectorId::new(3), 1);
    assert_eq!(bitmap.allocate(1), Some(SectorId::new(3)));
    assert_eq!(bitmap.allocate(2), Some(SectorId::new(6)));
    assert_eq!(bitmap.allocated(), 6);
}

#[test]
fn bitmap_runs_out() {
    let bitmap = bitmap(100);

    assert_eq!(bitmap.allocate(0), None);
    assert_eq!(bitmap.allocate(101), None);
    assert_eq!(bitmap.allocate(100), Some(SectorId::new(2)));
    assert_eq!(bitmap.allocate(1), None);

    bitmap.release(SectorId::new(50), 1);
    assert_eq!(bitmap.allocate(1), Some(SectorId::new(50)));
}

#[test]
#[should_panic]
fn bitmap_refuses_double_release() {
    let bitmap = bitmap(100);
    let sector = bitmap.allocate(1).unwrap();
    bitmap.release(sector, 1);
    bitmap.release(sector, 1);
}

#[test]
#[should_panic]
fn bitmap_refuses_sectors_outside_the_area() {
    let bitmap = bitmap(100);
    bitmap.release(SectorId::new(1), 1);
}

#[test]
fn blank_disk_is_unformatted() {
    assert_eq!(FileSystem::load(RamDisk::new()).err(), Some(Error::Unformatted));
}

#[test]
fn files_survive_remount() {
    let disk = RamDisk::new();
    let content: Vec<u8> = (0..3 * SECTOR_SIZE + 17).map(|i| (i % 251) as u8).collect();

    let sector = {
        let fs = FileSystem::format(disk.clone(), 1000);
        let sector = fs.create_file(content.len() as i32).unwrap();
        // 超级块与一个位图扇区之后就是数据区域
        assert_eq!(sector, SectorId::new(2));

        let inode = fs.open(sector).unwrap();
        assert_eq!(inode.write_at(0, &content), Ok(content.len()));
        drop(inode);
        fs.sync();
        sector
    };

    let fs = FileSystem::load(disk).unwrap();
    let inode = fs.open(sector).unwrap();
    let mut buf = vec![0; content.len()];
    assert_eq!(inode.read_at(0, &mut buf), content.len());
    assert_eq!(buf, content);

    // 位图也一并持久化了，新文件不会与旧文件重叠
    let other = fs.create_file(sectors(1)).unwrap();
    assert!(other > sector + 4);
}

#[test]
fn removed_file_frees_its_bits() {
    let disk = RamDisk::new();
    let fs = FileSystem::format(disk, 64);

    let first = fs.create_file(sectors(10)).unwrap();
    let inode = fs.open(first).unwrap();
    inode.remove();
    drop(inode);

    let second = fs.create_file(sectors(10)).unwrap();
    assert_eq!(second, first);
}

#[test]
fn small_volume_reports_no_space() {
    let fs = FileSystem::format(RamDisk::new(), 16);

    // 16 - 超级块 - 位图 = 14 个数据扇区
    assert_eq!(fs.create_file(sectors(14)), Err(Error::NoSpace));
    assert!(fs.create_file(sectors(13)).is_ok());
    assert_eq!(fs.create_file(0), Err(Error::NoSpace));
}
