//! Example CLI tool for XAR archives.
//!
//! Usage:
//!   xar-tool info <archive>         - Show header and TOC information
//!   xar-tool list <archive>         - List entries in archive order
//!   xar-tool cat <archive> <file>   - Print file contents
//!   xar-tool verify <archive>       - Read every file and check its digests

use std::env;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::process;

use xarfs::{EntryKind, XarFsStream};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} <command> <archive> [args...]", args[0]);
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  info <archive>           Show header and TOC information");
        eprintln!("  list <archive>           List entries");
        eprintln!("  cat <archive> <file>     Print file contents");
        eprintln!("  verify <archive>         Check the digests of every file");
        process::exit(1);
    }

    let command = &args[1];
    let archive_path = &args[2];

    let result = match command.as_str() {
        "info" => cmd_info(archive_path),
        "list" => cmd_list(archive_path),
        "cat" => {
            if args.len() < 4 {
                eprintln!("Usage: {} cat <archive> <file_path>", args[0]);
                process::exit(1);
            }
            cmd_cat(archive_path, &args[3])
        }
        "verify" => cmd_verify(archive_path),
        _ => {
            eprintln!("Unknown command: {}", command);
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn open(path: &str) -> xarfs::Result<XarFsStream> {
    let file = BufReader::new(File::open(path)?);
    XarFsStream::open_seekable(file)
}

fn cmd_info(path: &str) -> xarfs::Result<()> {
    let fss = open(path)?;
    let info = fss.query_info();

    println!("Archive Information:");
    println!("  Version:           {}", info.version);
    println!("  Hash:              {:?}", info.hash_kind);
    println!("  TOC compressed:    {} bytes", info.toc_compressed_len);
    println!("  TOC uncompressed:  {} bytes", info.toc_uncompressed_len);
    println!("  TOC digest:        {}", hex::encode(&info.toc_digest));
    println!("  Heap offset:       {}", info.data_offset);

    Ok(())
}

fn cmd_list(path: &str) -> xarfs::Result<()> {
    let mut fss = open(path)?;

    while let Some(entry) = fss.next_entry()? {
        let info = entry.query_info()?;
        let size_str = match entry.kind {
            EntryKind::File => format!("{}", info.size),
            _ => "-".to_string(),
        };
        let kind = match entry.kind {
            EntryKind::File => '-',
            EntryKind::Directory => 'd',
            EntryKind::Symlink => 'l',
        };
        println!(
            "{}{:04o} {:>5} {:>5} {:>10} {}",
            kind,
            info.mode & 0o7777,
            info.uid,
            info.gid,
            size_str,
            entry.path
        );
    }

    Ok(())
}

fn cmd_cat(archive_path: &str, file_path: &str) -> xarfs::Result<()> {
    let mut fss = open(archive_path)?;
    let mut entry = fss.find_file(file_path)?;
    let data = entry.object.read_to_end_verified()?;

    io::stdout().write_all(&data)?;
    Ok(())
}

fn cmd_verify(path: &str) -> xarfs::Result<()> {
    let mut fss = open(path)?;
    let mut files = 0;
    let mut bytes = 0;

    while let Some(mut entry) = fss.next_entry()? {
        if entry.kind != EntryKind::File {
            continue;
        }
        let data = entry.object.read_to_end_verified()?;
        files += 1;
        bytes += data.len();
    }

    println!("Verified {} files, {} bytes", files, bytes);
    Ok(())
}
