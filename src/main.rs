//! pcapflow CLI entry point.

use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pcapflow::cli::{
    Args, Command, ExtractArgs, FlowFormat, IndexArgs, IndexMode, PacketFormat, ReindexArgs,
    SortArgs, SpliceArgs, SplitArgs,
};
use pcapflow_core::index::read_index_list_file;
use pcapflow_core::{
    read_splice_values, renumber_files, run_extract, run_split, sort_files, splice_file,
    FlowIndex, FlowRecord, PacketIndex, PacketRecord, Record, RecordReader,
};

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Set up logging
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();

    match &args.command {
        Command::Extract(extract) => run_extract_command(extract, args.verbose > 0),
        Command::Sort(sort) => run_sort_command(sort),
        Command::Index(index) => run_index_command(index),
        Command::Reindex(reindex) => run_reindex_command(reindex),
        Command::Split(split) => run_split_command(split, args.verbose > 0),
        Command::Splice(splice) => run_splice_command(splice),
    }
}

fn run_extract_command(args: &ExtractArgs, report: bool) -> Result<()> {
    let config = args.to_config()?;
    let stats = run_extract(&config, &args.files, &args.flows, &args.packets).with_context(|| {
        format!(
            "extraction into {} and {} failed",
            args.flows.display(),
            args.packets.display()
        )
    })?;
    if report {
        eprintln!("{stats}");
    }
    Ok(())
}

fn run_sort_command(args: &SortArgs) -> Result<()> {
    let order = args.order();
    info!(%order, files = args.files.len(), parallel = args.parallel, "sorting");
    let sorted = sort_files(&args.files, &order, args.parallel).context("sort failed")?;
    for (path, count) in sorted {
        info!(path = %path.display(), records = count, "sorted");
    }
    Ok(())
}

fn run_reindex_command(args: &ReindexArgs) -> Result<()> {
    renumber_files(&args.files, args.parallel).context("reindex failed")?;
    Ok(())
}

fn run_split_command(args: &SplitArgs, report: bool) -> Result<()> {
    let config = args.to_config()?;
    let stats = run_split(&config, &args.files)
        .with_context(|| format!("splitting into {} failed", config.dir.display()))?;
    if report {
        eprintln!("{stats}");
    }
    Ok(())
}

fn run_splice_command(args: &SpliceArgs) -> Result<()> {
    let values =
        read_splice_values(args.field(), &args.values).context("reading splice values failed")?;
    splice_file(&args.packets, &values)
        .with_context(|| format!("splicing into {} failed", args.packets.display()))?;
    Ok(())
}

fn run_index_command(args: &IndexArgs) -> Result<()> {
    let style = args.style();
    let mode = args.mode();

    let list = match &mode {
        IndexMode::Lookup { list, .. } => Some(
            read_index_list_file(list)
                .with_context(|| format!("failed to read flow list {}", list.display()))?,
        ),
        _ => None,
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if args.flows {
        let format = FlowFormat::new(&style, args.offset)?;
        for path in &args.files {
            check_random_access(path, &mode)?;
            print_flows(path, &mode, list.as_deref(), &format, &mut out)
                .with_context(|| format!("failed to index {}", path.display()))?;
        }
    } else {
        let format = PacketFormat::new(&style, args.offset)?;
        for path in &args.files {
            check_random_access(path, &mode)?;
            print_packets(path, &mode, list.as_deref(), &format, &mut out)
                .with_context(|| format!("failed to index {}", path.display()))?;
        }
    }

    out.flush()?;
    Ok(())
}

fn check_random_access(path: &Path, mode: &IndexMode) -> Result<()> {
    if *mode != IndexMode::Scan && path.as_os_str() == "-" {
        bail!("--head, --tail and --lookup need a record file, not stdin");
    }
    Ok(())
}

fn print_packets<W: Write>(
    path: &Path,
    mode: &IndexMode,
    list: Option<&[u32]>,
    format: &PacketFormat,
    out: &mut W,
) -> Result<()> {
    if *mode == IndexMode::Scan {
        for record in RecordReader::<_, PacketRecord>::open(path)? {
            format.write(out, &record?)?;
        }
        return Ok(());
    }

    let index = PacketIndex::open(path)?;
    let records = match mode {
        IndexMode::Head(n) => index.head(*n)?,
        IndexMode::Tail(n) => index.tail(*n)?,
        IndexMode::Lookup { reindex, .. } => {
            let flows = list.unwrap_or_default().iter().copied();
            for record in index.lookup_many(flows, *reindex) {
                format.write(out, &record?)?;
            }
            return Ok(());
        }
        IndexMode::Scan => &[],
    };
    for wire in records {
        format.write(out, &PacketRecord::from_wire(wire))?;
    }
    Ok(())
}

/// Flows are labelled with their stored id, which includes the base the
/// file was extracted with.
fn print_flows<W: Write>(
    path: &Path,
    mode: &IndexMode,
    list: Option<&[u32]>,
    format: &FlowFormat,
    out: &mut W,
) -> Result<()> {
    if *mode == IndexMode::Scan {
        for record in RecordReader::<_, FlowRecord>::open(path)? {
            let record = record?;
            format.write(out, record.id, &record)?;
        }
        return Ok(());
    }

    let index = FlowIndex::open(path)?;
    let records = match mode {
        IndexMode::Head(n) => index.head(*n)?,
        IndexMode::Tail(n) => index.tail(*n)?,
        IndexMode::Lookup { reindex, .. } => {
            for (position, &flow) in list.unwrap_or_default().iter().enumerate() {
                let Some(record) = index.lookup(flow)? else {
                    bail!("flow {flow} is not in the flow file ({} flows)", index.len());
                };
                let id = if *reindex { position as u32 } else { record.id };
                format.write(out, id, &record)?;
            }
            return Ok(());
        }
        IndexMode::Scan => &[],
    };
    for wire in records {
        let record = FlowRecord::from_wire(wire);
        format.write(out, record.id, &record)?;
    }
    Ok(())
}
