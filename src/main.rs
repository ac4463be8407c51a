use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use clonedef::airr::{default_output_path, DbFormat, DbReader, DbWriter};
use clonedef::assign::{assign_clones, CloneConfig, RunSummary};
use clonedef::cluster::Linkage;
use clonedef::distance::{DistanceModel, DistanceParams, Normalization, Symmetry};
use clonedef::preclone::{group_records, GroupAction, GroupConfig, GroupMode};
use clonedef::record::Receptor;
use clonedef::report::RunReport;

/// clonedef - assign V(D)J repertoire sequences to clonal groups
///
/// Records are bucketed by V gene, J gene and junction length, then each
/// bucket is partitioned into clones by hierarchical clustering of junction
/// distances under a selectable substitution model.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Input tab-delimited database file
    #[clap(short = 'd', long = "db", value_name = "FILE")]
    db: PathBuf,

    /// Output file for records with assigned clones (derived from the input
    /// name if not specified)
    #[clap(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Input/output schema: "airr" or "changeo"
    #[clap(long = "format", default_value = "airr")]
    format: String,

    /// Field used to calculate distance between records
    /// (defaults to junction / JUNCTION per format)
    #[clap(long = "sf", value_name = "FIELD")]
    seq_field: Option<String>,

    /// Field containing the germline V segment call
    #[clap(long = "vf", value_name = "FIELD")]
    v_field: Option<String>,

    /// Field containing the germline J segment call
    #[clap(long = "jf", value_name = "FIELD")]
    j_field: Option<String>,

    /// Additional fields for exact-match grouping besides V, J and junction length
    #[clap(long = "gf", value_name = "FIELD", num_args = 1..)]
    group_fields: Vec<String>,

    /// Use the V(D)J "allele" or "gene" for initial grouping
    #[clap(long = "mode", default_value = "gene")]
    mode: String,

    /// Handling of multi-valued gene calls: "first" uses only the first
    /// listed gene, "set" links buckets sharing any assignment
    #[clap(long = "act", default_value = "set")]
    action: String,

    /// Substitution model: ham, aa, hh_s1f, hh_s5f, mk_rs1nf, mk_rs5nf,
    /// hs1f_compat or m1n_compat
    #[clap(long = "model", default_value = "ham")]
    model: String,

    /// Distance threshold for clonal grouping
    #[clap(long = "dist", default_value = "0.0")]
    distance: f64,

    /// Distance normalization: "len", "mut" or "none"
    #[clap(long = "norm", default_value = "len")]
    norm: String,

    /// Combining asymmetric distances: "avg" or "min"
    #[clap(long = "sym", default_value = "avg")]
    sym: String,

    /// Linkage for hierarchical clustering: "single", "average" or "complete"
    #[clap(long = "link", default_value = "single")]
    linkage: String,

    /// Maximum number of non-ACGT characters permitted in the junction
    /// before the record is excluded from clonal assignment
    #[clap(long = "maxmiss", default_value = "0")]
    max_missing: usize,

    /// Tab-delimited 5-mer score table, required by the 5-mer models
    #[clap(long = "model-path", value_name = "FILE")]
    model_path: Option<PathBuf>,

    /// Write records failing clonal assignment to a clone-fail file
    #[clap(long = "failed")]
    failed: bool,

    /// Write a run log to this file
    #[clap(long = "log", value_name = "FILE")]
    log: Option<PathBuf>,

    /// Quiet mode (no progress output)
    #[clap(long = "quiet")]
    quiet: bool,

    /// Number of threads for bucket clustering (0 = all cores)
    #[clap(short = 't', long = "threads", default_value = "0")]
    threads: usize,
}

/// Configuration resolved from the command line, validated before any
/// records are read.
struct RunConfig {
    format: DbFormat,
    group: GroupConfig,
    clone: CloneConfig,
}

fn resolve_config(args: &Args) -> Result<RunConfig> {
    let format = DbFormat::from_name(&args.format)
        .ok_or_else(|| anyhow::anyhow!("unrecognized format: {}", args.format))?;
    let mode = GroupMode::from_name(&args.mode)
        .ok_or_else(|| anyhow::anyhow!("unrecognized mode: {}", args.mode))?;
    let action = GroupAction::from_name(&args.action)
        .ok_or_else(|| anyhow::anyhow!("unrecognized action: {}", args.action))?;
    let model = DistanceModel::from_name(&args.model)
        .ok_or_else(|| anyhow::anyhow!("unrecognized distance model: {}", args.model))?;
    let norm = Normalization::from_name(&args.norm)
        .ok_or_else(|| anyhow::anyhow!("unrecognized normalization: {}", args.norm))?;
    let sym = Symmetry::from_name(&args.sym)
        .ok_or_else(|| anyhow::anyhow!("unrecognized symmetry method: {}", args.sym))?;
    let linkage = Linkage::from_name(&args.linkage)
        .ok_or_else(|| anyhow::anyhow!("unrecognized linkage: {}", args.linkage))?;

    if args.distance < 0.0 {
        bail!("distance threshold must be non-negative");
    }

    let params = DistanceParams::new(model, norm, sym, args.model_path.as_deref())?;

    let seq_field = args
        .seq_field
        .clone()
        .unwrap_or_else(|| format.seq_field().to_string());
    let v_field = args
        .v_field
        .clone()
        .unwrap_or_else(|| format.v_field().to_string());
    let j_field = args
        .j_field
        .clone()
        .unwrap_or_else(|| format.j_field().to_string());

    Ok(RunConfig {
        format,
        group: GroupConfig {
            v_field,
            j_field,
            seq_field: seq_field.clone(),
            group_fields: args.group_fields.clone(),
            mode,
            action,
        },
        clone: CloneConfig {
            seq_field,
            max_missing: args.max_missing,
            params,
            linkage,
            threshold: args.distance,
        },
    })
}

fn write_outputs(
    args: &Args,
    config: &RunConfig,
    columns: &[String],
    records: &[Receptor],
) -> Result<(PathBuf, Option<PathBuf>)> {
    let pass_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.db, "pass"));
    let mut pass_writer = DbWriter::create(&pass_path, columns, config.format)?;

    // Pass records grouped by clone id so related sequences sit together
    let mut by_clone: Vec<(u64, usize)> = records
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.clone_id.map(|c| (c, i)))
        .collect();
    by_clone.sort();
    for &(_, idx) in &by_clone {
        pass_writer.write_record(&records[idx])?;
    }
    pass_writer.finish()?;

    // Fail file only on request and only when something failed
    let mut fail_path = None;
    if args.failed {
        let failing: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.clone_id.is_none())
            .map(|(i, _)| i)
            .collect();
        if !failing.is_empty() {
            let path = default_output_path(&args.db, "fail");
            let mut fail_writer = DbWriter::create(&path, columns, config.format)?;
            for idx in failing {
                fail_writer.write_record(&records[idx])?;
            }
            fail_writer.finish()?;
            fail_path = Some(path);
        }
    }
    Ok((pass_path, fail_path))
}

fn write_report(
    args: &Args,
    config: &RunConfig,
    summary: &RunSummary,
    pass_path: &std::path::Path,
) -> Result<()> {
    let mut report = match &args.log {
        Some(path) => RunReport::create(path)?,
        None => RunReport::disabled(),
    };

    report.start_block(
        "clonedef",
        &[
            ("FILE", args.db.display().to_string()),
            ("SEQ_FIELD", config.clone.seq_field.clone()),
            ("V_FIELD", config.group.v_field.clone()),
            ("J_FIELD", config.group.j_field.clone()),
            ("MODE", config.group.mode.name().to_string()),
            ("ACTION", config.group.action.name().to_string()),
            ("MODEL", config.clone.params.model.name().to_string()),
            ("DISTANCE", args.distance.to_string()),
            ("NORM", config.clone.params.norm.name().to_string()),
            ("SYM", config.clone.params.sym.name().to_string()),
            ("LINKAGE", config.clone.linkage.name().to_string()),
            ("MAX_MISSING", args.max_missing.to_string()),
        ],
    )?;

    for log in &summary.bucket_logs {
        report.block(&[
            ("VCALL", log.v_group.clone()),
            ("JCALL", log.j_group.clone()),
            ("JUNCLEN", log.junction_length.to_string()),
            ("RECORDS", log.records.to_string()),
            ("CLONED", log.passed.to_string()),
            ("FILTERED", log.failed.to_string()),
            ("UNIQUE", log.unique.to_string()),
            ("CLONES", log.clones.to_string()),
        ])?;
    }

    report.end_block(
        "clonedef",
        &[
            ("OUTPUT", pass_path.display().to_string()),
            ("CLONES", summary.clone_count.to_string()),
            ("RECORDS", summary.records.to_string()),
            ("PASS", summary.pass_records.to_string()),
            ("FAIL", summary.fail_records.to_string()),
        ],
    )?;
    report.finish()
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    // All configuration errors surface before any records are read
    let config = resolve_config(&args)?;

    if args.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
            .context("failed to configure thread pool")?;
    }

    let progress = if !args.quiet {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap(),
        );
        pb.set_message("Reading records...");
        Some(pb)
    } else {
        None
    };

    let mut reader = DbReader::from_path(&args.db)?;
    reader.check_fields(&[
        config.format.id_field(),
        config.group.seq_field.as_str(),
        config.group.v_field.as_str(),
        config.group.j_field.as_str(),
    ])?;
    let columns = reader.columns.clone();
    let mut records = reader.read_all()?;
    log::info!("read {} records from {}", records.len(), args.db.display());

    if let Some(pb) = &progress {
        pb.set_message("Grouping sequences...");
    }
    let index = group_records(&records, &config.group);
    log::info!(
        "{} preclone groups, {} records unassigned",
        index.buckets.len(),
        index.unassigned.len()
    );

    if let Some(pb) = &progress {
        pb.set_message("Assigning clones...");
    }
    let summary = assign_clones(&mut records, &index, &config.clone)?;

    let (pass_path, fail_path) = write_outputs(&args, &config, &columns, &records)?;
    write_report(&args, &config, &summary, &pass_path)?;

    if let Some(pb) = progress {
        pb.finish_with_message(format!(
            "{} clones from {} records ({} failed)",
            summary.clone_count, summary.records, summary.fail_records
        ));
    }
    if let Some(path) = fail_path {
        log::info!("failed records written to {}", path.display());
    }

    Ok(())
}
