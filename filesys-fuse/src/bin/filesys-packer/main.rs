mod cli;

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command};
use filesys::{File, FileSystem, InodeHandle, SectorId};
use filesys_fuse::BlockFile;

fn main() -> io::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let fs = match cli.command {
        Command::Format { image, sectors } => {
            let block_file = Arc::new(BlockFile::create(&image.image, sectors)?);
            let fs = FileSystem::format(block_file, sectors);
            log::info!("formatted {:?} with {sectors} sectors", image.image);
            fs
        }
        Command::Pack { image, source } => {
            let fs = load(&image.image)?;
            let data = fs::read(&source)?;
            let length = i32::try_from(data.len())
                .map_err(|_| io::Error::other(format!("{source:?} is too large")))?;

            let sector = fs.create_file(length).map_err(io::Error::other)?;
            let inode = fs.open(sector).map_err(io::Error::other)?;
            inode.write_at(0, &data).map_err(io::Error::other)?;
            log::info!("packed {source:?} ({} bytes) into {sector}", data.len());
            println!("{}", u32::from(sector));
            fs
        }
        Command::Cat { image, sector } => {
            let (fs, inode) = open(&image.image, sector)?;
            let mut file = File::new(inode);
            io::stdout().lock().write_all(&file.read_all())?;
            fs
        }
        Command::Rm { image, sector } => {
            let (fs, inode) = open(&image.image, sector)?;
            inode.remove();
            log::info!("removed inode at sector {sector}");
            fs
        }
    };

    fs.sync();
    Ok(())
}

fn load(image: &Path) -> io::Result<Arc<FileSystem>> {
    let block_file = Arc::new(BlockFile::open(image)?);
    FileSystem::load(block_file).map_err(io::Error::other)
}

fn open(image: &Path, sector: u32) -> io::Result<(Arc<FileSystem>, InodeHandle)> {
    let block_file = Arc::new(BlockFile::open(image)?);
    block_file.check_sector(sector)?;
    let fs = FileSystem::load(block_file).map_err(io::Error::other)?;
    let inode = fs.open(SectorId::new(sector)).map_err(io::Error::other)?;
    Ok((fs, inode))
}
