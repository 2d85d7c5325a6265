//! Turns one chat update into ledger calls and the replies they produce.
//!
//! Handlers never talk to Telegram directly: they return the outbound calls,
//! built only after the ledger work has committed.

use common::{
    CreditAction, Entity, LedgerError, LedgerResult, Role, SettleOutcome, TipDraft, User,
    UserStatus,
};

use super::action::{Callback, Command};
use super::render;
use super::reply::{Outbound, Screen};
use super::update::{CallbackQuery, Message, Sender, Update};
use super::views::{MessageHandle, ViewKind};
use crate::state::AppState;

const NOT_REGISTERED: &str = "You're not registered. Send /start first.";
const NO_RIGHTS: &str = "You have no rights for this command.";

pub async fn handle_update(state: &AppState, update: &Update) -> Vec<Outbound> {
    if let Some(query) = &update.callback_query {
        return on_callback(state, query).await;
    }
    if let Some(message) = &update.message {
        return on_message(state, message).await;
    }
    log::debug!("Ignoring update {} without message or callback", update.update_id);
    Vec::new()
}

fn report(context: &str, e: &LedgerError) {
    match e {
        LedgerError::Storage(_) => log::error!("{} failed: {}", context, e),
        _ => log::debug!("{} rejected: {}", context, e),
    }
}

async fn on_message(state: &AppState, message: &Message) -> Vec<Outbound> {
    let (Some(from), Some(text)) = (&message.from, &message.text) else {
        return Vec::new();
    };
    let Some(command) = Command::parse(text) else {
        log::debug!("Unknown command from {}: {}", from.id, text);
        return Vec::new();
    };

    let chat_id = message.chat.id;
    match run_command(state, chat_id, from, command).await {
        Ok(outbound) => outbound,
        Err(e) => {
            report("Command", &e);
            vec![Outbound::text(chat_id, e.user_message())]
        }
    }
}

async fn run_command(
    state: &AppState,
    chat_id: i64,
    from: &Sender,
    command: Command,
) -> LedgerResult<Vec<Outbound>> {
    let is_admin = state.is_admin(from.id);
    match command {
        Command::Start => {
            let user = state
                .db
                .register_user(from.id, from.handle().as_deref())
                .await?
                .user;
            if user.requested_role.is_none() {
                return Ok(vec![Outbound::send(chat_id, render::choose_role())]);
            }
            Ok(vec![Outbound::text(chat_id, render::welcome(&user, is_admin))])
        }
        Command::Help => {
            let Some(user) = state.db.user_by_telegram(from.id).await? else {
                return Ok(vec![Outbound::text(chat_id, NOT_REGISTERED)]);
            };
            Ok(vec![Outbound::text(chat_id, render::help(&user, is_admin))])
        }
        Command::Balance => {
            let Some(user) = state.db.user_by_telegram(from.id).await? else {
                return Ok(vec![Outbound::text(chat_id, NOT_REGISTERED)]);
            };
            if !user.is_approved() {
                return Ok(vec![Outbound::text(
                    chat_id,
                    format!("⏳ Your account is {}. Cannot check balance yet.", user.status),
                )]);
            }
            let balance = state.db.balance_of(user.id).await?;
            Ok(vec![Outbound::text(chat_id, render::balance(&user, balance))])
        }
        Command::Tipsters => {
            let Some(user) = state.db.user_by_telegram(from.id).await? else {
                return Ok(vec![Outbound::text(chat_id, NOT_REGISTERED)]);
            };
            if !user.is_approved() || user.is_tipster() {
                return Ok(vec![Outbound::text(
                    chat_id,
                    "You don't have access to this command.",
                )]);
            }
            let screen = render_view(state, from.id, ViewKind::Tipsters).await?;
            Ok(vec![Outbound::tracked(chat_id, screen, from.id, ViewKind::Tipsters)])
        }
        Command::NewTip(payload) => new_tip(state, chat_id, from, &payload).await,
        Command::PendingUsers | Command::PendingTips | Command::Credits if !is_admin => {
            Ok(vec![Outbound::text(chat_id, NO_RIGHTS)])
        }
        Command::PendingUsers => list(state, chat_id, from.id, ViewKind::PendingUsers).await,
        Command::PendingTips => list(state, chat_id, from.id, ViewKind::OpenTips).await,
        Command::Credits => list(state, chat_id, from.id, ViewKind::Credits).await,
        Command::Text(raw) if is_admin => credit_input(state, chat_id, from.id, &raw).await,
        Command::Text(_) => Ok(Vec::new()),
    }
}

async fn list(
    state: &AppState,
    chat_id: i64,
    owner: i64,
    kind: ViewKind,
) -> LedgerResult<Vec<Outbound>> {
    let screen = render_view(state, owner, kind).await?;
    Ok(vec![Outbound::tracked(chat_id, screen, owner, kind)])
}

async fn new_tip(
    state: &AppState,
    chat_id: i64,
    from: &Sender,
    payload: &str,
) -> LedgerResult<Vec<Outbound>> {
    let Some(user) = state.db.user_by_telegram(from.id).await? else {
        return Ok(vec![Outbound::text(
            chat_id,
            "You are not registered in the system.",
        )]);
    };
    if !(user.is_approved() && user.is_tipster()) {
        return Ok(vec![Outbound::text(
            chat_id,
            "You do not have permission to publish tips.",
        )]);
    }

    let draft = TipDraft::parse(payload)?;
    let published = match state.db.publish_tip(&user, &draft).await {
        Ok(published) => published,
        Err(LedgerError::InsufficientBalance { .. }) => {
            return Ok(vec![Outbound::text(
                chat_id,
                "❌ You don't have enough balance to cover recommended stake.",
            )]);
        }
        Err(e) => return Err(e),
    };

    let mut outbound = vec![Outbound::text(
        chat_id,
        render::tip_published(&published.tip, published.audience.len()),
    )];
    let offer = render::tip_offer(&published.tip);
    outbound.extend(
        published
            .audience
            .iter()
            .map(|subscriber| Outbound::send(subscriber.telegram_id, offer.clone())),
    );
    Ok(outbound)
}

/// Feeds an admin's free text into their pending credit operation, if any.
async fn credit_input(
    state: &AppState,
    chat_id: i64,
    admin_id: i64,
    raw: &str,
) -> LedgerResult<Vec<Outbound>> {
    let Some(outcome) = state.credits.submit(&state.db, admin_id, raw).await else {
        return Ok(Vec::new());
    };

    let receipt = match outcome {
        Ok(receipt) => receipt,
        Err(LedgerError::Validation(e)) => return Ok(vec![Outbound::text(chat_id, e.to_string())]),
        Err(e) => {
            report("Credit", &e);
            return Ok(vec![Outbound::text(
                chat_id,
                format!("❌ Failed: {}", e.user_message()),
            )]);
        }
    };

    let mut outbound = vec![
        Outbound::text(chat_id, render::credit_receipt(&receipt)),
        Outbound::text(receipt.user.telegram_id, render::credit_notice(&receipt)),
    ];
    if receipt.went_negative() {
        outbound.push(Outbound::text(chat_id, render::NEGATIVE_BALANCE_WARNING));
    }
    outbound.extend(refresh(state, admin_id, ViewKind::PendingUsers).await);
    outbound.extend(refresh(state, admin_id, ViewKind::Credits).await);
    Ok(outbound)
}

async fn render_view(state: &AppState, owner: i64, kind: ViewKind) -> LedgerResult<Screen> {
    let db = &state.db;
    let screen = match kind {
        ViewKind::PendingUsers => render::pending_users(&db.pending_users().await?),
        ViewKind::OpenTips => render::open_tips(&db.open_tips().await?),
        ViewKind::Credits => render::credits(
            &db.approved_users(Role::User).await?,
            &db.approved_users(Role::Tipster).await?,
        ),
        ViewKind::Tipsters => {
            let user = db
                .user_by_telegram(owner)
                .await?
                .ok_or(LedgerError::not_found(Entity::User, owner))?;
            render::tipsters(&db.tipsters_for(user.id).await?)
        }
    };
    Ok(screen)
}

/// Re-renders a tracked list in place. Failures only cost freshness.
async fn refresh(state: &AppState, owner: i64, kind: ViewKind) -> Vec<Outbound> {
    let Some(handle) = state.views.get(owner, kind).await else {
        return Vec::new();
    };
    match render_view(state, owner, kind).await {
        Ok(screen) => vec![Outbound::edit(handle, screen)],
        Err(e) => {
            log::warn!("Failed to refresh {:?} for {}: {}", kind, owner, e);
            Vec::new()
        }
    }
}

fn origin(query: &CallbackQuery) -> Option<MessageHandle> {
    query.message.as_ref().map(|m| MessageHandle {
        chat_id: m.chat.id,
        message_id: m.message_id,
    })
}

/// Replaces the pressed message, or sends a new one when it is unknown.
fn show(query: &CallbackQuery, screen: Screen) -> Outbound {
    match origin(query) {
        Some(handle) => Outbound::edit(handle, screen),
        None => Outbound::send(query.chat_id(), screen),
    }
}

/// Turns the pressed message back into the `kind` list and tracks it.
async fn relist(
    state: &AppState,
    query: &CallbackQuery,
    kind: ViewKind,
) -> LedgerResult<Option<Outbound>> {
    let owner = query.from.id;
    let Some(handle) = origin(query).or(state.views.get(owner, kind).await) else {
        return Ok(None);
    };
    let screen = render_view(state, owner, kind).await?;
    state.views.record(owner, kind, handle).await;
    Ok(Some(Outbound::edit(handle, screen)))
}

async fn back_to(
    state: &AppState,
    query: &CallbackQuery,
    kind: ViewKind,
    note: &str,
) -> LedgerResult<Vec<Outbound>> {
    Ok(match relist(state, query, kind).await? {
        Some(edit) => vec![Outbound::answer(&query.id, note), edit],
        None => vec![Outbound::alert(&query.id, "Session expired.")],
    })
}

async fn open_credit(
    state: &AppState,
    query: &CallbackQuery,
    user_id: i64,
    action: CreditAction,
) -> LedgerResult<Vec<Outbound>> {
    let user = state.db.user(user_id).await?;
    state.credits.open(query.from.id, user.id, action).await;
    Ok(vec![
        Outbound::answer(&query.id, format!("Enter amount to {action}.")),
        show(query, render::credit_prompt(&user, action)),
    ])
}

async fn require_user(state: &AppState, telegram_id: i64) -> LedgerResult<User> {
    state
        .db
        .user_by_telegram(telegram_id)
        .await?
        .ok_or(LedgerError::not_found(Entity::User, telegram_id))
}

async fn on_callback(state: &AppState, query: &CallbackQuery) -> Vec<Outbound> {
    let Some(data) = query.data.as_deref() else {
        return Vec::new();
    };
    let callback = match data.parse::<Callback>() {
        Ok(callback) => callback,
        Err(e) => {
            log::warn!("Callback from {}: {}", query.from.id, e);
            return vec![Outbound::alert(&query.id, "Unknown action.")];
        }
    };
    if callback.is_admin_only() && !state.is_admin(query.from.id) {
        return vec![Outbound::alert(&query.id, "No rights.")];
    }

    match run_callback(state, query, callback).await {
        Ok(outbound) => outbound,
        Err(e) => {
            report("Callback", &e);
            vec![Outbound::alert(&query.id, e.user_message())]
        }
    }
}

async fn run_callback(
    state: &AppState,
    query: &CallbackQuery,
    callback: Callback,
) -> LedgerResult<Vec<Outbound>> {
    let id = query.id.as_str();
    let from = query.from.id;
    let db = &state.db;

    match callback {
        Callback::RequestRole(role) => {
            let user = db.request_role(from, role).await?;
            Ok(vec![
                Outbound::answer(id, format!("Requested role: {role}")),
                show(query, render::role_requested(role, user.status)),
            ])
        }
        Callback::Subscribe(tipster_id) => {
            let user = require_user(state, from).await?;
            let tipster = db.subscribe(&user, tipster_id).await?;
            let mut outbound = vec![Outbound::answer(
                id,
                format!("✅ Subscribed to {}!", tipster.display_name()),
            )];
            outbound.extend(refresh(state, from, ViewKind::Tipsters).await);
            Ok(outbound)
        }
        Callback::Unsubscribe(tipster_id) => {
            let user = require_user(state, from).await?;
            if !db.unsubscribe(&user, tipster_id).await? {
                return Ok(vec![Outbound::alert(
                    id,
                    "You are not subscribed to this tipster.",
                )]);
            }
            let tipster = db.user(tipster_id).await?;
            let mut outbound = vec![Outbound::answer(
                id,
                format!("❌ Unsubscribed from {}!", tipster.display_name()),
            )];
            outbound.extend(refresh(state, from, ViewKind::Tipsters).await);
            Ok(outbound)
        }
        Callback::PendingShow(user_id) => {
            let user = db.user(user_id).await?;
            if user.status != UserStatus::Pending {
                return Ok(vec![Outbound::alert(id, "User not found.")]);
            }
            Ok(vec![
                Outbound::answer(id, "User details"),
                show(query, render::pending_detail(&user)),
            ])
        }
        Callback::PendingBack => back_to(state, query, ViewKind::PendingUsers, "🔙 Back to list").await,
        Callback::SetRole { user_id, role } => {
            let user = match db.approve_user(user_id, role).await {
                Ok(user) => user,
                Err(LedgerError::NotFound { .. }) => {
                    return Ok(vec![Outbound::alert(
                        id,
                        "User not found or already approved.",
                    )]);
                }
                Err(e) => return Err(e),
            };
            state.credits.open(from, user.id, CreditAction::Add).await;
            let mut outbound = vec![
                Outbound::answer(id, format!("✅ {role}! Send credits amount ➡️")),
                Outbound::text(user.telegram_id, render::approved_notice(role)),
                Outbound::text(query.chat_id(), render::approval_prompt(&user)),
            ];
            outbound.extend(refresh(state, from, ViewKind::PendingUsers).await);
            Ok(outbound)
        }
        Callback::Reject(user_id) => {
            let user = db.reject_user(user_id).await?;
            let mut outbound = vec![
                Outbound::answer(id, format!("❌ {} rejected!", user.display_name())),
                Outbound::text(user.telegram_id, render::REJECTED_NOTICE),
            ];
            outbound.extend(refresh(state, from, ViewKind::PendingUsers).await);
            Ok(outbound)
        }
        Callback::TipShow(tip_id) => {
            let listing = db.tip_listing(tip_id).await?;
            if !listing.tip.is_open() {
                return Ok(vec![Outbound::alert(id, "Tip not found or already closed.")]);
            }
            Ok(vec![
                Outbound::answer(id, "Tip details"),
                show(query, render::tip_detail(&listing)),
            ])
        }
        Callback::TipsBack => back_to(state, query, ViewKind::OpenTips, "Back to list").await,
        Callback::CloseTip { tip_id, result } => {
            let settlement = match db.settle_tip(tip_id, result).await? {
                SettleOutcome::Settled(settlement) => settlement,
                SettleOutcome::AlreadySettled(_) => {
                    return Ok(vec![Outbound::answer(id, "Tip not OPEN.")]);
                }
            };
            let mut outbound = vec![Outbound::answer(
                id,
                format!(
                    "Tip {} {} ({} bets)",
                    tip_id,
                    result,
                    settlement.payouts.len()
                ),
            )];
            outbound.extend(settlement.payouts.iter().map(|payout| {
                Outbound::text(payout.telegram_id, render::bettor_result(&settlement, payout))
            }));
            outbound.push(Outbound::text(
                settlement.tipster_telegram_id,
                render::tipster_result(&settlement),
            ));
            match relist(state, query, ViewKind::OpenTips).await {
                Ok(list) => outbound.extend(list),
                Err(e) => log::warn!("Failed to refresh open tips after settling {}: {}", tip_id, e),
            }
            Ok(outbound)
        }
        Callback::CreditsUser(user_id) => {
            let user = db.user(user_id).await?;
            if !user.is_approved() {
                return Ok(vec![Outbound::alert(id, "User not found.")]);
            }
            Ok(vec![
                Outbound::answer(id, format!("Selected {}", user.display_name())),
                show(query, render::credit_actions(&user)),
            ])
        }
        Callback::CreditsAdd(user_id) => {
            open_credit(state, query, user_id, CreditAction::Add).await
        }
        Callback::CreditsRemove(user_id) => {
            open_credit(state, query, user_id, CreditAction::Remove).await
        }
        Callback::CreditsBack => back_to(state, query, ViewKind::Credits, "Back to list.").await,
        Callback::ConfirmBet { tip_id, stake } => {
            let user = require_user(state, from).await?;
            let confirmation = db.confirm_bet(user.id, tip_id, stake).await?;
            Ok(vec![
                Outbound::answer(id, format!("✅ Bet {} recorded!", confirmation.bet.stake)),
                show(
                    query,
                    Screen::plain(format!("Tip {tip_id} - PLAYED! (you can't play again)")),
                ),
                Outbound::text(query.chat_id(), render::bet_confirmed(&confirmation)),
            ])
        }
        Callback::SkipBet(_) => Ok(vec![Outbound::answer(id, "OK, skipped.")]),
    }
}
