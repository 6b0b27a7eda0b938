// Copyright 2026 The pathkit authors.

//! Minimal command-line driver for exercising [`pathkit`] against a live
//! backend: `pathkit-demo <command> <uri> [dst-uri]`.
//!
//! This is a demo, not the library's public interface — it owns the one
//! thing a library never should: initializing the global `tracing`
//! subscriber.

use std::io::Write;
use std::process::ExitCode;

use pathkit::backend::{OpenMode, OpenOptions};
use pathkit::{registry, Path};

fn usage() -> ! {
    eprintln!("usage: pathkit-demo <stat|ls|walk|glob|cat|cp|mv> <uri> [dst-uri]");
    std::process::exit(2)
}

fn run() -> pathkit::Result<()> {
    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_else(|| usage());
    let uri = args.next().unwrap_or_else(|| usage());
    let path = Path::parse(&uri);

    match command.as_str() {
        "stat" => {
            let (resolved, backend) = registry().resolve(&path)?;
            let stat = backend.stat(&resolved, true)?;
            println!(
                "{}: {} bytes, mtime={}, dir={}",
                registry().unresolve(&resolved),
                stat.size,
                stat.mtime,
                stat.is_dir()
            );
        }
        "ls" => {
            let (resolved, backend) = registry().resolve(&path)?;
            for entry in backend.scandir(&resolved)? {
                let entry = entry?;
                println!("{}", entry.name);
            }
        }
        "walk" => {
            let (resolved, backend) = registry().resolve(&path)?;
            for level in backend.walk(&resolved, false)? {
                let level = level?;
                println!("{}: {} dirs, {} files", registry().unresolve(&level.root), level.dirs.len(), level.files.len());
            }
        }
        "glob" => {
            for m in pathkit::glob_in(registry(), &uri, true, true)? {
                println!("{}", registry().unresolve(&m));
            }
        }
        "cat" => {
            let (resolved, backend) = registry().resolve(&path)?;
            let mut handle = backend.open(&resolved, OpenMode::Read, &OpenOptions::default())?.into_read()?;
            std::io::copy(&mut handle, &mut std::io::stdout()).map_err(|e| pathkit::PathError::from_io(e, uri.clone()))?;
            handle.close()?;
        }
        "cp" => {
            let dst_uri = args.next().unwrap_or_else(|| usage());
            let dst = Path::parse(&dst_uri);
            pathkit::transfer::copy(registry(), &path, &dst, true, true, None)?;
        }
        "mv" => {
            let dst_uri = args.next().unwrap_or_else(|| usage());
            let dst = Path::parse(&dst_uri);
            pathkit::transfer::rename(registry(), &path, &dst, true)?;
        }
        _ => usage(),
    }
    std::io::stdout().flush().ok();
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("pathkit-demo: {e}");
            ExitCode::FAILURE
        }
    }
}
