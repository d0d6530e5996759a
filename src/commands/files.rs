//! File and directory commands against a single disk.
//!
//! Each command maps to one [`Disk`] operation:
//! - `disks ls` - `list_contents` / `list_files` / `list_dirs`
//! - `disks cat` - `read_stream`, copied to stdout
//! - `disks put` - `write_stream` from a file or stdin, or `write`
//! - `disks rm|cp|mv|touch|mkdir|rmdir` - the matching operation
//! - `disks stat` - `metadata`, printed as JSON
//! - `disks url` - `url`

use anyhow::{Context, Result, bail};
use disks::backend::ByteStream;
use disks::{Disk, Entry};
use tokio::io::AsyncWriteExt;

use crate::Commands;
use crate::utils::{format_size, format_timestamp};

/// Execute a file command.
pub async fn execute(disk: &Disk, command: Commands) -> Result<()> {
    match command {
        Commands::Ls {
            dir,
            recursive,
            extensions,
            dirs,
        } => {
            let entries = if dirs {
                disk.list_dirs(&dir, recursive).await?
            } else if extensions.is_empty() {
                disk.list_contents(&dir, recursive).await?
            } else {
                let extensions: Vec<&str> = extensions.iter().map(String::as_str).collect();
                disk.list_files(&dir, recursive, &extensions).await?
            };
            print_entries(&entries);
        },
        Commands::Cat { path } => {
            let mut stream = disk.read_stream(&path).await?;
            let mut stdout = tokio::io::stdout();
            tokio::io::copy(&mut stream, &mut stdout)
                .await
                .context("Failed to write to stdout")?;
            stdout.flush().await?;
        },
        Commands::Put {
            path,
            from,
            content,
            public,
        } => {
            if let Some(content) = content {
                disk.write(&path, content, public).await?;
            } else {
                let stream: ByteStream = match from {
                    Some(file) => Box::new(
                        tokio::fs::File::open(&file)
                            .await
                            .with_context(|| format!("Failed to open {}", file.display()))?,
                    ),
                    None => Box::new(tokio::io::stdin()),
                };
                disk.write_stream(&path, stream, public).await?;
            }
            println!("Wrote {path} to disk '{}'", disk.name());
        },
        Commands::Rm { path } => {
            disk.delete(&path).await?;
            println!("Deleted {path}");
        },
        Commands::Cp { from, to } => {
            disk.copy(&from, &to).await?;
            println!("Copied {from} -> {to}");
        },
        Commands::Mv { from, to } => {
            disk.move_file(&from, &to).await?;
            println!("Moved {from} -> {to}");
        },
        Commands::Touch { path } => {
            disk.touch(&path).await?;
        },
        Commands::Mkdir { path, public } => {
            disk.create_dir(&path, public).await?;
            println!("Created {path}/");
        },
        Commands::Rmdir { path } => {
            disk.delete_dir(&path).await?;
            println!("Deleted {path}/");
        },
        Commands::Stat { path } => {
            let metadata = disk.metadata(&path).await?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        },
        Commands::Url { path } => {
            println!("{}", disk.url(&path).await?);
        },
        Commands::Check => bail!("'check' does not operate on a disk"),
    }
    Ok(())
}

fn print_entries(entries: &[Entry]) {
    for entry in entries {
        if entry.is_dir() {
            println!("{:>8}  {:16}  {}/", "-", "", entry.path);
        } else {
            println!(
                "{:>8}  {:16}  {}",
                entry.size.map_or_else(|| "-".to_string(), format_size),
                entry.timestamp.map_or_else(String::new, format_timestamp),
                entry.path
            );
        }
    }
}
