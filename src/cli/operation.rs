//! Operation commands: new, list, show, submit, sign, assign-team.

use clap::{Subcommand, ValueEnum};
use jiff::Timestamp;
use uuid::Uuid;

use crate::{
    compliance,
    identity::resolve_identity,
    model::{Document, DocumentKind, Operation, OperationStatus},
    workflow::operation_step,
};

use super::{
    Context,
    format::{format_compliance, format_dive, local_time, short_id},
    resolve_operation,
};

#[derive(Debug, Subcommand)]
pub enum OperationCommand {
    /// Create a new operation. Prints the operation ID.
    New {
        /// What the operation is (e.g. "Pier 4 inspection").
        name: String,
    },

    /// List operations with their workflow step.
    List,

    /// Show an operation's paperwork, dives, workflow step and gate.
    Show {
        /// Operation ID: full UUID or unambiguous prefix.
        operation: String,
    },

    /// Submit an unsigned compliance document.
    Submit {
        /// Operation ID: full UUID or unambiguous prefix.
        operation: String,

        kind: DocumentKindArg,
    },

    /// Sign a submitted document and re-check the gate.
    Sign {
        /// Operation ID: full UUID or unambiguous prefix.
        operation: String,

        kind: DocumentKindArg,

        /// Who signs. Defaults to the resolved identity.
        #[arg(long = "as")]
        identity: Option<String>,
    },

    /// Assign the dive team and re-check the gate.
    AssignTeam {
        /// Operation ID: full UUID or unambiguous prefix.
        operation: String,

        /// Team ID.
        #[arg(required_unless_present = "unassign")]
        team: Option<Uuid>,

        /// Remove the current team instead.
        #[arg(long, conflicts_with = "team")]
        unassign: bool,
    },
}

/// CLI-facing document kind, mapped to the domain `DocumentKind`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DocumentKindArg {
    WorkPermit,
    SafetyAnnex,
}

impl DocumentKindArg {
    fn to_domain(self) -> DocumentKind {
        match self {
            Self::WorkPermit => DocumentKind::WorkPermit,
            Self::SafetyAnnex => DocumentKind::SafetyAnnex,
        }
    }
}

pub(super) fn run(command: OperationCommand, ctx: &Context) -> Result<(), String> {
    match command {
        OperationCommand::New { name } => cmd_new(ctx, &name),
        OperationCommand::List => cmd_list(ctx),
        OperationCommand::Show { operation } => cmd_show(ctx, &operation),
        OperationCommand::Submit { operation, kind } => cmd_submit(ctx, &operation, kind),
        OperationCommand::Sign {
            operation,
            kind,
            identity,
        } => cmd_sign(ctx, &operation, kind, identity.as_deref()),
        OperationCommand::AssignTeam {
            operation,
            team,
            unassign,
        } => cmd_assign_team(ctx, &operation, if unassign { None } else { team }),
    }
}

fn cmd_new(ctx: &Context, name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("operation name must not be empty".to_string());
    }
    let operation = Operation {
        id: Uuid::new_v4(),
        name: name.trim().to_string(),
        status: OperationStatus::Planned,
        team_id: None,
        created_at: Timestamp::now(),
    };
    ctx.storage
        .create_operation(&operation)
        .map_err(|e| format!("failed to create operation: {e}"))?;

    println!("{}", operation.id);
    Ok(())
}

fn cmd_list(ctx: &Context) -> Result<(), String> {
    let operations = ctx
        .storage
        .list_operations()
        .map_err(|e| format!("failed to list operations: {e}"))?;

    if operations.is_empty() {
        println!("No operations");
        return Ok(());
    }

    for op in &operations {
        let step = operation_step(&ctx.storage, op.id);
        println!(
            "{}  [{}]  next: {:<12} {}",
            short_id(op.id),
            op.status.as_str(),
            step.as_str(),
            op.name
        );
    }
    Ok(())
}

fn cmd_show(ctx: &Context, reference: &str) -> Result<(), String> {
    let id = resolve_operation(&ctx.storage, reference)?;
    let operation = ctx
        .storage
        .load_operation(id)
        .map_err(|e| format!("failed to load operation: {e}"))?;
    let compliance =
        compliance::evaluate(&ctx.storage, id).map_err(|e| format!("failed to read documents: {e}"))?;

    println!("{}  {}  [{}]", short_id(id), operation.name, operation.status.as_str());
    println!("{}", format_compliance(&compliance));

    let documents = ctx
        .storage
        .list_documents(id)
        .map_err(|e| format!("failed to list documents: {e}"))?;
    for doc in documents.iter().filter(|d| d.signed) {
        if let (Some(by), Some(at)) = (&doc.signed_by, doc.signed_at) {
            println!("  {} signed by {by} at {}", doc.kind.label(), local_time(at, &ctx.tz));
        }
    }

    let dives = ctx
        .storage
        .list_dives(Some(id))
        .map_err(|e| format!("failed to list dives: {e}"))?;
    if !dives.is_empty() {
        println!("Dives:");
        for dive in &dives {
            println!("  {}", format_dive(dive));
        }
    }
    Ok(())
}

fn cmd_submit(ctx: &Context, reference: &str, kind: DocumentKindArg) -> Result<(), String> {
    let operation_id = resolve_operation(&ctx.storage, reference)?;
    let document = Document {
        id: Uuid::new_v4(),
        operation_id,
        kind: kind.to_domain(),
        signed: false,
        signed_at: None,
        signed_by: None,
        created_at: Timestamp::now(),
    };
    ctx.storage
        .submit_document(&document)
        .map_err(|e| format!("failed to submit document: {e}"))?;

    eprintln!("Submitted {} for {}", document.kind.label(), short_id(operation_id));
    Ok(())
}

fn cmd_sign(
    ctx: &Context,
    reference: &str,
    kind: DocumentKindArg,
    identity: Option<&str>,
) -> Result<(), String> {
    let identity = resolve_identity(identity, &ctx.config)?;
    let operation_id = resolve_operation(&ctx.storage, reference)?;

    let (document, compliance) = compliance::sign_document(
        &ctx.storage,
        operation_id,
        kind.to_domain(),
        &identity,
        Timestamp::now(),
    )
    .map_err(|e| format!("failed to sign document: {e}"))?;

    eprintln!("Signed {} as {identity}", document.kind.label());
    println!("{}", format_compliance(&compliance));
    Ok(())
}

fn cmd_assign_team(ctx: &Context, reference: &str, team: Option<Uuid>) -> Result<(), String> {
    let operation_id = resolve_operation(&ctx.storage, reference)?;
    let compliance = compliance::assign_team(&ctx.storage, operation_id, team)
        .map_err(|e| format!("failed to assign team: {e}"))?;

    match team {
        Some(team) => eprintln!("Team {} assigned", short_id(team)),
        None => eprintln!("Team unassigned"),
    }
    println!("{}", format_compliance(&compliance));
    Ok(())
}
