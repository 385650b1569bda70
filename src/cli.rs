//! Command-line interface and REPL

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use rustyline::DefaultEditor;
use serde::Serialize;
use std::path::PathBuf;
use stream_restore::core::MemoryCore;
use stream_restore::protocol::{Connection, Reply, Request, RestoreRecord, UpdateMode};
use stream_restore::seed::SeedTable;
use stream_restore::volume::{volume_from_db, CVolume, ChannelMap, ChannelPosition, Volume, VOLUME_MAX, VOLUME_NORM};
use stream_restore::StreamRestore;

/// Commands available on the command line and in the REPL
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List all remembered entries
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Create or update an entry
    Write {
        /// Stream key, e.g. `sink-input-by-media-role:music`
        name: String,
        /// Device to route the stream to
        #[arg(short, long)]
        device: Option<String>,
        /// Per-channel volume as POSITION=VALUE (raw, NN% or NNdB)
        #[arg(short, long = "volume", value_name = "POS=VALUE")]
        volumes: Vec<String>,
        /// Mute state
        #[arg(short, long)]
        mute: Option<bool>,
        /// How the record combines with what is stored
        #[arg(long, value_enum, default_value = "merge")]
        mode: UpdateMode,
    },
    /// Delete entries
    Delete {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Add default volumes from a fallback table file
    Import { file: PathBuf },
    /// Migrate legacy records and drop unreadable ones
    Clean,
    /// Interactive shell
    Repl,
}

#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_version_flag = true)]
struct ReplLine {
    #[command(subcommand)]
    command: Command,
}

/// One client session against the restore subsystem
pub struct Session {
    restore: StreamRestore,
    core: MemoryCore,
    conn: Connection,
}

impl Session {
    pub fn new(restore: StreamRestore, core: MemoryCore) -> Self {
        let (conn, _events) = Connection::new(0, "stream-restore-cli");
        Self {
            restore,
            core,
            conn,
        }
    }

    pub fn run(&mut self, command: &Command) -> Result<()> {
        match command {
            Command::List { json } => {
                let records = self.read()?;
                if *json {
                    print_json(&records)?;
                } else {
                    print_table(&records);
                }
            }
            Command::Write {
                name,
                device,
                volumes,
                mute,
                mode,
            } => {
                let record = self.build_record(name, device.as_deref(), volumes, *mute)?;
                let request = Request::Write {
                    mode: *mode,
                    apply_immediately: true,
                    records: vec![record],
                };
                self.restore
                    .handle_request(&mut self.core, &self.conn, request)
                    .with_context(|| format!("Failed to write entry '{}'", name))?;
                println!("{} {}", "Stored".green(), name.bold());
            }
            Command::Delete { names } => {
                let request = Request::Delete {
                    names: names.clone(),
                };
                self.restore
                    .handle_request(&mut self.core, &self.conn, request)?;
                println!("{} {} entries", "Deleted".yellow(), names.len());
            }
            Command::Import { file } => {
                let added = self
                    .restore
                    .load_seed_table(&SeedTable::Required(file.clone()))?;
                println!("{} {} entries from {}", "Imported".green(), added, file.display());
            }
            Command::Clean => {
                let report = self.restore.clean_up_store();
                println!(
                    "{} migrated, {} removed",
                    report.migrated.len().to_string().green(),
                    report.removed.len().to_string().red()
                );
            }
            Command::Repl => bail!("already in the REPL"),
        }
        Ok(())
    }

    /// Shut the subsystem down, flushing the database
    pub fn finish(self) {
        self.restore.shutdown();
    }

    fn read(&mut self) -> Result<Vec<RestoreRecord>> {
        match self
            .restore
            .handle_request(&mut self.core, &self.conn, Request::Read)?
        {
            Reply::Entries(records) => Ok(records),
            other => Err(anyhow!("unexpected reply {:?}", other)),
        }
    }

    fn build_record(
        &self,
        name: &str,
        device: Option<&str>,
        volumes: &[String],
        mute: Option<bool>,
    ) -> Result<RestoreRecord> {
        let mut positions = Vec::with_capacity(volumes.len());
        let mut values = Vec::with_capacity(volumes.len());
        for arg in volumes {
            let (pos, value) = parse_channel_volume(arg)?;
            positions.push(pos);
            values.push(value);
        }

        // The wire record always carries a mute state; keep the stored one
        let muted = mute.unwrap_or_else(|| {
            self.restore
                .store()
                .read_entry(name)
                .and_then(|e| e.muted)
                .unwrap_or(false)
        });

        Ok(RestoreRecord {
            name: name.to_owned(),
            channel_map: ChannelMap::new(positions),
            volume: CVolume::new(values),
            device: device.map(str::to_owned),
            muted,
        })
    }
}

/// Interactive loop; `exit`, `quit` or EOF leave it
pub fn run_repl(session: &mut Session) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("stream-restore> ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    break;
                }
                let _ = rl.add_history_entry(line);

                match ReplLine::try_parse_from(line.split_whitespace()) {
                    Ok(parsed) => {
                        if let Err(e) = session.run(&parsed.command) {
                            eprintln!("{} {:#}", "error:".red().bold(), e);
                        }
                    }
                    Err(e) => {
                        let _ = e.print();
                    }
                }
            }
            Err(_) => break,
        }
    }

    Ok(())
}

/// `front-left=65536`, `fl=100%`, `mono=-6dB`
fn parse_channel_volume(arg: &str) -> Result<(ChannelPosition, Volume)> {
    let (pos, value) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("expected POSITION=VALUE, got '{}'", arg))?;
    let pos: ChannelPosition = pos.parse().map_err(|e: String| anyhow!(e))?;
    let value = value.trim();

    let volume = if let Some(percent) = value.strip_suffix('%') {
        let percent: f64 = percent
            .parse()
            .with_context(|| format!("invalid percentage '{}'", value))?;
        (percent / 100.0 * VOLUME_NORM as f64).round().clamp(0.0, VOLUME_MAX as f64) as Volume
    } else if let Some(db) = value
        .strip_suffix("dB")
        .or_else(|| value.strip_suffix("db"))
    {
        let db: f64 = db
            .parse()
            .with_context(|| format!("invalid decibel value '{}'", value))?;
        volume_from_db(db)
    } else {
        value
            .parse()
            .with_context(|| format!("invalid volume '{}'", value))?
    };

    Ok((pos, volume))
}

#[derive(Serialize)]
struct ChannelView {
    position: String,
    volume: u32,
}

#[derive(Serialize)]
struct RecordView<'a> {
    name: &'a str,
    device: Option<&'a str>,
    muted: bool,
    volume: Vec<ChannelView>,
}

fn print_json(records: &[RestoreRecord]) -> Result<()> {
    let views: Vec<RecordView<'_>> = records
        .iter()
        .map(|r| RecordView {
            name: &r.name,
            device: r.device.as_deref(),
            muted: r.muted,
            volume: r
                .channel_map
                .positions()
                .iter()
                .zip(r.volume.values())
                .map(|(p, v)| ChannelView {
                    position: p.to_string(),
                    volume: *v,
                })
                .collect(),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&views)?);
    Ok(())
}

fn print_table(records: &[RestoreRecord]) {
    if records.is_empty() {
        println!("{}", "No entries".dimmed());
        return;
    }
    for r in records {
        println!("{}", r.name.bold());
        println!(
            "  device: {}",
            r.device.as_deref().unwrap_or("-").cyan()
        );
        if r.volume.channels() > 0 {
            println!("  volume: {} ({})", r.volume, r.channel_map);
        }
        let muted = if r.muted { "yes".red() } else { "no".green() };
        println!("  muted:  {}", muted);
    }
}
