use clap::{Args as ClapArgs, Parser, Subcommand};
use common::{Role, TipResult};

#[derive(Parser, Debug)]
#[command(author, version, about = "FlashTip CLI - ledger maintenance without the chat bot")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add or remove credits on a user's wallet
    ///
    /// Goes through the same ledger path as the admin chat flow and is
    /// recorded as ADMIN_CREDIT / ADMIN_DEBIT with reference `admin`.
    Credit(CreditArgs),

    /// Close an open tip with a result and pay out its bets
    ///
    /// No chat notifications are sent.
    Settle(SettleArgs),

    /// Approve a pending user with the given role
    Approve(ApproveArgs),

    /// Compare every wallet balance with the sum of its transactions
    Reconcile,

    /// Export the whole transaction log to CSV
    ExportTransactions(ExportArgs),
}

#[derive(ClapArgs, Debug)]
pub struct CreditArgs {
    #[arg(short, long, help = "Telegram id of the wallet owner")]
    pub telegram_id: i64,

    /// Whole credits, 1 to 999999
    #[arg(short, long, help = "Whole number of credits")]
    pub amount: String,

    #[arg(short, long, help = "Remove credits instead of adding them")]
    pub remove: bool,
}

#[derive(ClapArgs, Debug)]
pub struct SettleArgs {
    #[arg(short, long, help = "Id of the open tip")]
    pub tip_id: i64,

    #[arg(short, long, help = "WIN or LOSE")]
    pub result: TipResult,
}

#[derive(ClapArgs, Debug)]
pub struct ApproveArgs {
    #[arg(short, long, help = "Internal user id")]
    pub user_id: i64,

    #[arg(short, long, help = "USER or TIPSTER")]
    pub role: Role,
}

#[derive(ClapArgs, Debug)]
pub struct ExportArgs {
    #[arg(short, long, help = "Output CSV file path")]
    pub out: String,
}
