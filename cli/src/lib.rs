mod args;

pub use args::{ApproveArgs, Args, Commands, CreditArgs, ExportArgs, SettleArgs};
use anyhow::Context;
use clap::Parser;
use common::{
    CreditAction, CreditReceipt, Database, Reconciliation, SettleOutcome, TipResult, User,
    parse_credit_amount,
};

/// Runs the CLI command parser and executes the selected command.
/// Returns true if a CLI command was handled, false otherwise.
pub async fn run_cli() -> bool {
    let args = Args::parse();
    let Some(command) = &args.command else {
        println!("No CLI command provided. Use --help to see available commands.");
        return false;
    };

    let db = match connect().await {
        Ok(db) => db,
        Err(e) => {
            eprintln!("{e:#}");
            return true;
        }
    };

    match command {
        Commands::Credit(credit_args) => {
            match credit(&db, credit_args).await {
                Ok(receipt) => {
                    println!(
                        "{} {} credits for telegram id {}. Balance: {}",
                        receipt.action.past_tense(),
                        receipt.amount,
                        receipt.user.telegram_id,
                        receipt.balance
                    );
                    if receipt.went_negative() {
                        println!("Warning: balance is now negative.");
                    }
                }
                Err(e) => eprintln!("Failed to adjust credits: {e:#}"),
            }
        }
        Commands::Settle(settle_args) => {
            match settle(&db, settle_args.tip_id, settle_args.result).await {
                Ok(SettleOutcome::Settled(settlement)) => println!(
                    "Tip #{} closed as {}: {} bets paid, tipster payout {}",
                    settlement.tip_id,
                    settlement.result,
                    settlement.payouts.len(),
                    settlement.tipster_payout
                ),
                Ok(SettleOutcome::AlreadySettled(tip_id)) => {
                    println!("Tip #{tip_id} was already settled, nothing changed.")
                }
                Err(e) => eprintln!("Failed to settle tip: {e:#}"),
            }
        }
        Commands::Approve(approve_args) => {
            match approve(&db, approve_args.user_id, approve_args.role).await {
                Ok(user) => println!("Approved {} as {}", user.display_name(), user.role),
                Err(e) => eprintln!("Failed to approve user: {e:#}"),
            }
        }
        Commands::Reconcile => match mismatches(&db).await {
            Ok(rows) if rows.is_empty() => println!("All wallets match their transaction log."),
            Ok(rows) => {
                for row in rows {
                    println!(
                        "user {}: balance {} but transactions sum to {}",
                        row.user_id, row.balance, row.ledger_total
                    );
                }
            }
            Err(e) => eprintln!("Failed to reconcile: {e:#}"),
        },
        Commands::ExportTransactions(export_args) => {
            match export_transactions(&db, &export_args.out).await {
                Ok(count) => println!("Exported {} transactions to {}", count, export_args.out),
                Err(e) => eprintln!("Failed to export transactions: {e:#}"),
            }
        }
    }
    true
}

async fn connect() -> anyhow::Result<Database> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    Database::new(&database_url).await
}

async fn credit(db: &Database, args: &CreditArgs) -> anyhow::Result<CreditReceipt> {
    let amount = parse_credit_amount(&args.amount)?;
    let user = db
        .user_by_telegram(args.telegram_id)
        .await?
        .with_context(|| format!("No user with telegram id {}", args.telegram_id))?;
    let action = if args.remove {
        CreditAction::Remove
    } else {
        CreditAction::Add
    };
    Ok(db.adjust_balance(user.id, action, amount).await?)
}

async fn settle(db: &Database, tip_id: i64, result: TipResult) -> anyhow::Result<SettleOutcome> {
    Ok(db.settle_tip(tip_id, result).await?)
}

async fn approve(db: &Database, user_id: i64, role: common::Role) -> anyhow::Result<User> {
    db.approve_user(user_id, role)
        .await
        .with_context(|| format!("User {user_id} is missing or not pending"))
}

/// Wallets whose balance differs from the sum of their transactions.
async fn mismatches(db: &Database) -> anyhow::Result<Vec<Reconciliation>> {
    let rows = db.reconcile().await?;
    Ok(rows.into_iter().filter(|r| !r.is_balanced()).collect())
}

/// Writes every transaction to `path` as CSV, returning the row count.
async fn export_transactions(db: &Database, path: &str) -> anyhow::Result<usize> {
    let rows = db.all_transactions().await?;
    let file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create {path}"))?;
    let mut wtr = csv_async::AsyncSerializer::from_writer(file);
    for row in &rows {
        wtr.serialize(row).await?;
    }
    wtr.flush().await?;
    Ok(rows.len())
}
