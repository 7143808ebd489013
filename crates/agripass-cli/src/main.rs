// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Agri-Pass command line.
//
// Entry point. Initialises logging, parses the command, opens the data
// directory when the command needs records, and prints results as JSON.

mod context;
mod data_dir;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use agripass_core::error::{AgripassError, Result};
use agripass_core::human_errors::{Severity, humanize_error};
use agripass_core::types::{
    Actor, BatchId, BatchStatus, CertificateId, CertificateStatus, Exporter, HeavyMetalOutcome,
    InspectionResult, NewBatch, PesticideLevel, QualityGrade, Role,
};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use context::AppContext;

#[derive(Parser)]
#[command(name = "agripass", version, about = "Agricultural export certification and offline credential scanning")]
struct Cli {
    /// Data directory (default: $XDG_DATA_HOME/agripass)
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,

    /// Never contact the credential authority; use the local fallback
    #[arg(long, global = true)]
    offline: bool,

    /// Id of the operator performing state changes
    #[arg(long = "actor", global = true, default_value = "operator")]
    actor_id: String,

    /// Role of the operator (exporter, qa_agency, admin, importer); a
    /// registered operator always acts with their registered role
    #[arg(long, global = true, default_value = "qa_agency")]
    role: Role,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a JSON object into a compact QR token
    Encode {
        /// JSON file, or `-` for stdin
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
    /// Unpack a compact token (or plain JSON) into its record
    Decode { token: String },
    /// Integrity hash of a certificate's sealed fields
    Hash {
        #[arg(long)]
        certificate_id: String,
        #[arg(long)]
        batch_id: String,
        #[arg(long, default_value = "VALID")]
        status: CertificateStatus,
        /// Issuance time, RFC 3339
        #[arg(long)]
        issued_at: DateTime<Utc>,
    },
    /// Check whether the credential authority is reachable
    Health,
    /// Verify a scanned token
    Verify {
        token: String,
        /// Compare against local records only
        #[arg(long)]
        local: bool,
    },
    /// Register a new batch
    Submit(SubmitArgs),
    /// Record an inspection result (starts the inspection if needed)
    Inspect(InspectArgs),
    /// Reject a batch under inspection
    Reject {
        batch_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Reopen a rejected batch for a new inspection cycle
    Reopen { batch_id: String },
    /// Issue a certificate for an inspected batch
    Issue { batch_id: String },
    /// Revoke a certificate
    Revoke {
        certificate_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Restore a revoked certificate (admin only)
    Restore {
        certificate_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Show a batch (with its certificates) or a single certificate
    Show { id: String },
    /// List batches, optionally by status
    List {
        #[arg(long)]
        status: Option<BatchStatus>,
    },
    /// Print the offline badge token for a certificate
    Token { certificate_id: String },
    /// Batch and certificate counts
    Stats,
    /// Audit trail for an entity, or the most recent entries
    Audit {
        entity_id: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Manage operator accounts
    #[command(subcommand)]
    User(UserCommand),
    /// Show the effective configuration
    Config {
        /// Write it to config.json in the data directory
        #[arg(long)]
        save: bool,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    /// Register a user, or change an existing user's role (admin only)
    Add {
        id: String,
        #[arg(long = "as")]
        role: Role,
        #[arg(long)]
        name: Option<String>,
    },
    /// List registered users
    List {
        #[arg(long)]
        role: Option<Role>,
    },
}

#[derive(clap::Args)]
struct SubmitArgs {
    #[arg(long)]
    exporter: String,
    #[arg(long)]
    exporter_id: Option<String>,
    #[arg(long)]
    contact: Option<String>,
    #[arg(long)]
    product: String,
    /// Free-form, e.g. "18 t"
    #[arg(long)]
    quantity: String,
    #[arg(long)]
    origin: String,
    #[arg(long)]
    destination: String,
    #[arg(long)]
    notes: Option<String>,
    /// Supporting document reference; repeatable
    #[arg(long = "document")]
    documents: Vec<String>,
}

#[derive(clap::Args)]
struct InspectArgs {
    batch_id: String,
    /// A+, A, B+, B, C+, C, D, F or Rejected
    #[arg(long)]
    grade: QualityGrade,
    #[arg(long)]
    moisture: f64,
    #[arg(long, default_value = "Safe")]
    pesticide: PesticideLevel,
    #[arg(long, default_value = "Pass")]
    heavy_metal: HeavyMetalOutcome,
    #[arg(long, default_value = "ISO 22000")]
    iso: String,
    #[arg(long)]
    inspector_name: Option<String>,
    #[arg(long)]
    sample_id: Option<String>,
    #[arg(long)]
    foreign_matter: Option<f64>,
    #[arg(long)]
    notes: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => report(&e),
    }
}

fn report(err: &AgripassError) -> ExitCode {
    tracing::debug!(error = %err, "command failed");
    let human = humanize_error(err);
    eprintln!("error: {}", human.message);
    eprintln!("  {}", human.suggestion);
    if human.retriable {
        eprintln!("  (safe to try again)");
    }
    match human.severity {
        Severity::Tampered => ExitCode::from(3),
        _ => ExitCode::FAILURE,
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read_to_string(path)?)
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    // Commands that never touch the records.
    match &cli.command {
        Commands::Encode { input } => {
            let record: serde_json::Value = serde_json::from_str(&read_input(input)?)?;
            println!("{}", agripass_codec::encode(&record)?);
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Decode { token } => {
            let decoded = agripass_codec::decode(token)?;
            print_json(&json!({ "format": decoded.format, "record": decoded.record }))?;
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Hash {
            certificate_id,
            batch_id,
            status,
            issued_at,
        } => {
            let digest = agripass_security::integrity::digest_fields(
                certificate_id,
                batch_id,
                *status,
                issued_at,
            )?;
            println!("{digest}");
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let data_dir = cli.data_dir.clone().unwrap_or_else(data_dir::default_data_dir);
    let ctx = AppContext::init(data_dir, cli.offline)?;
    let svc = &ctx.service;
    // Only state changes need a resolved operator.
    let operator = || svc.resolve_actor(&cli.actor_id, cli.role);

    match cli.command {
        Commands::Encode { .. } | Commands::Decode { .. } | Commands::Hash { .. } => {}

        Commands::Health => {
            let up = svc.gateway().check_health().await;
            print_json(&json!({
                "authority": ctx.config.authority.certify_url,
                "reachable": up,
            }))?;
            if !up {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Verify { token, local } => {
            let accepted = if local {
                let check = svc.verify_offline(&token)?;
                print_json(&check)?;
                check.is_valid()
            } else {
                let result = svc.verify_token(&token).await?;
                print_json(&result)?;
                result.verdict.valid
            };
            if !accepted {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Submit(args) => {
            let actor = operator()?;
            let batch = svc.submit_batch(
                &actor,
                NewBatch {
                    exporter: Exporter {
                        name: args.exporter,
                        id: args.exporter_id,
                        contact: args.contact,
                    },
                    product_type: args.product,
                    quantity: args.quantity,
                    origin: args.origin,
                    destination: args.destination,
                    notes: args.notes,
                    documents: args.documents,
                },
            )?;
            print_json(&batch)?;
        }

        Commands::Inspect(args) => {
            let actor = operator()?;
            let id = BatchId::from(args.batch_id.as_str());
            if svc.batch_view(&id)?.batch.status == BatchStatus::Submitted {
                svc.begin_inspection(&actor, &id)?;
            }
            let result = InspectionResult {
                grade: args.grade,
                moisture_percent: args.moisture,
                pesticide_level: args.pesticide,
                heavy_metal: args.heavy_metal,
                iso_code: args.iso,
                inspector_id: actor.id.clone(),
                inspector_name: args.inspector_name,
                inspected_at: Utc::now(),
                sample_id: args.sample_id,
                foreign_matter_percent: args.foreign_matter,
                notes: args.notes,
            };
            print_json(&svc.record_inspection(&actor, &id, result)?)?;
        }

        Commands::Reject { batch_id, reason } => {
            let actor = operator()?;
            let batch =
                svc.reject_batch(&actor, &BatchId::from(batch_id.as_str()), reason.as_deref())?;
            print_json(&batch)?;
        }

        Commands::Reopen { batch_id } => {
            let actor = operator()?;
            print_json(&svc.reopen_batch(&actor, &BatchId::from(batch_id.as_str()))?)?;
        }

        Commands::Issue { batch_id } => {
            let actor = operator()?;
            let issued = svc
                .issue_certificate(&actor, &BatchId::from(batch_id.as_str()))
                .await?;
            if let Some(notice) = issued.trust_notice {
                eprintln!("note: {notice}");
            }
            print_json(&json!({
                "certificate_id": issued.certificate.id,
                "batch_id": issued.certificate.batch_id,
                "authority": issued.authority,
                "issued_at": issued.certificate.issued_at,
                "expires_at": issued.certificate.expires_at,
                "hash": issued.certificate.hash,
                "token": issued.token,
            }))?;
        }

        Commands::Revoke {
            certificate_id,
            reason,
        } => {
            let actor = operator()?;
            let report = svc.revoke_certificate(
                &actor,
                &CertificateId::from(certificate_id.as_str()),
                reason.as_deref(),
            )?;
            print_json(&report)?;
        }

        Commands::Restore {
            certificate_id,
            reason,
        } => {
            let actor = operator()?;
            let report = svc.restore_certificate(
                &actor,
                &CertificateId::from(certificate_id.as_str()),
                reason.as_deref(),
            )?;
            print_json(&report)?;
        }

        Commands::Show { id } => {
            if id.starts_with("CERT-") {
                let report = svc.certificate_report(&CertificateId::from(id.as_str()))?;
                print_json(&report)?;
                if report.is_tampered() {
                    eprintln!("warning: stored record does not match its integrity hash");
                    return Ok(ExitCode::from(3));
                }
            } else {
                print_json(&svc.batch_view(&BatchId::from(id.as_str()))?)?;
            }
        }

        Commands::List { status } => {
            print_json(&svc.list_batches(status)?)?;
        }

        Commands::Token { certificate_id } => {
            println!(
                "{}",
                svc.compact_token(&CertificateId::from(certificate_id.as_str()))?
            );
        }

        Commands::Stats => {
            print_json(&svc.stats()?)?;
        }

        Commands::Audit { entity_id, limit } => {
            let entries = match entity_id {
                Some(id) => ctx.audit.entries_for_entity(&id)?,
                None => ctx.audit.recent_entries(limit)?,
            };
            print_json(&entries)?;
        }

        Commands::User(UserCommand::Add { id, role, name }) => {
            let actor = operator()?;
            let mut user = Actor::new(id, role);
            user.name = name;
            print_json(&svc.register_user(&actor, user)?)?;
        }

        Commands::User(UserCommand::List { role }) => {
            print_json(&svc.list_users(role)?)?;
        }

        Commands::Config { save } => {
            if save {
                ctx.save_config()?;
            }
            print_json(&ctx.config)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
