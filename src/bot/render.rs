//! Message texts and keyboards. Everything here is pure formatting.

use common::{
    BetConfirmation, CreditAction, CreditReceipt, Payout, Role, Settlement, Tip, TipListing,
    TipResult, TipsterEntry, User, UserStatus,
};
use rust_decimal::Decimal;

use super::action::Callback;
use super::reply::{Button, Keyboard, Screen};

const ADMIN_COMMANDS: &str = "\n🔧 ADMIN COMMANDS:\n\
    👥 • /pending_users - list of pending users\n\
    📊 • /pending_tips - open tips list\n\
    💰 • /credits - add or remove credits\n";

fn role_commands(role: Role) -> &'static str {
    match role {
        Role::Tipster => {
            "🎯 TIPSTER COMMANDS:\n\
             ➕ • /newtip BookingCode odds stake - post tip\n\
             ➕ • /balance - check your balance\n"
        }
        Role::User => {
            "📋 YOUR COMMANDS:\n\
             👥 • /tipsters - list of all tipsters\n\
             ➕ • /balance - check your balance\n\
             📋 • /help - command list\n"
        }
    }
}

pub fn choose_role() -> Screen {
    Screen::new(
        "Welcome! Choose which role you want to sign up for:",
        Keyboard::new().row(vec![
            Button::new("👥 USER", &Callback::RequestRole(Role::User)),
            Button::new("🎯 TIPSTER", &Callback::RequestRole(Role::Tipster)),
        ]),
    )
}

/// `/start` reply for a user who already picked a role.
pub fn welcome(user: &User, is_admin: bool) -> String {
    let mut text = match user.status {
        UserStatus::Pending => format!(
            "⏳ Your request is sent.\nRequested role: {}\n\nWaiting for admin approval.\n",
            user.requested_role.unwrap_or(user.role)
        ),
        UserStatus::Approved => format!(
            "✅ Welcome {}! Your account has been approved.\nYour role: {}.\n\n{}",
            user.display_name(),
            user.role,
            role_commands(user.role)
        ),
        UserStatus::Rejected => {
            "❌ Your account has been rejected. Contact admin if you think it's a mistake.\n"
                .to_string()
        }
    };
    if is_admin {
        text.push_str(ADMIN_COMMANDS);
    }
    text
}

pub fn help(user: &User, is_admin: bool) -> String {
    let mut text = format!("Your commands ({}):\n\n", user.display_name());
    match user.status {
        UserStatus::Pending => text.push_str("⏳ Waiting for admin approval.\n"),
        UserStatus::Approved => text.push_str(role_commands(user.role)),
        UserStatus::Rejected => text.push_str("❌ Account rejected. Contact admin.\n"),
    }
    if is_admin {
        text.push_str(ADMIN_COMMANDS);
    }
    text
}

pub fn balance(user: &User, balance: Decimal) -> String {
    let mut text = format!(
        "{} ({})\n\n💰 Balance: {:.2}",
        user.display_name(),
        user.role,
        balance
    );
    if user.role == Role::User {
        text.push_str("\n\n👥 Follow tipsters with /tipsters");
    }
    text
}

pub fn role_requested(role: Role, status: UserStatus) -> Screen {
    let follow_up = if status == UserStatus::Approved {
        "Your account has already been approved."
    } else {
        "Admin will review your request and accept or reject your account."
    };
    Screen::plain(format!("✅ You signed up as {role}.\n\n{follow_up}"))
}

pub fn tipsters(entries: &[TipsterEntry]) -> Screen {
    let subscribed = entries.iter().filter(|e| e.subscribed).count();
    let mut keyboard = Keyboard::new();
    for entry in entries {
        let (label, callback) = if entry.subscribed {
            (format!("✅ {}", entry.display_name()), Callback::Unsubscribe(entry.id))
        } else {
            (format!("👤 {}", entry.display_name()), Callback::Subscribe(entry.id))
        };
        keyboard = keyboard.button(label, &callback);
    }
    Screen::new(
        format!(
            "🎯 Active tipsters ({total}):\n\n📊 Your subscriptions: {subscribed}/{total}",
            total = entries.len()
        ),
        keyboard,
    )
}

pub fn pending_users(users: &[User]) -> Screen {
    if users.is_empty() {
        return Screen::plain("No users waiting for approval.");
    }
    let keyboard = users.iter().fold(Keyboard::new(), |kb, user| {
        kb.button(user.display_name(), &Callback::PendingShow(user.id))
    });
    Screen::new(format!("⏳ Pending users ({}):", users.len()), keyboard)
}

pub fn pending_detail(user: &User) -> Screen {
    let registered = user
        .created_at
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let requested = user
        .requested_role
        .map(|role| role.to_string())
        .unwrap_or_else(|| "not chosen".to_string());
    Screen::new(
        format!(
            "👤 {}\n🆔 ID: {}\n📱 TG ID: {}\n📅 Registered: {}\n🎯 Requested role: {}",
            user.display_name(),
            user.id,
            user.telegram_id,
            registered,
            requested
        ),
        Keyboard::new()
            .row(vec![
                Button::new(
                    "👥 USER",
                    &Callback::SetRole {
                        user_id: user.id,
                        role: Role::User,
                    },
                ),
                Button::new(
                    "🎯 TIPSTER",
                    &Callback::SetRole {
                        user_id: user.id,
                        role: Role::Tipster,
                    },
                ),
            ])
            .button("❌ REJECT", &Callback::Reject(user.id))
            .button("🔙 Back to list", &Callback::PendingBack),
    )
}

pub fn approved_notice(role: Role) -> String {
    format!(
        "🎉 Your account is APPROVED!\n\n✅ Role: {role}\n💰 Credits will be added soon...\n\n\
         Send /start or /help to see your commands."
    )
}

pub fn approval_prompt(user: &User) -> String {
    format!(
        "✅ {} → {}\n\n💰 Enter credit amount:\nExample: 1000 (just send the number)",
        user.display_name(),
        user.role
    )
}

pub const REJECTED_NOTICE: &str =
    "❌ Your account is rejected. Contact admin if you think it's a mistake.";

pub fn open_tips(listings: &[TipListing]) -> Screen {
    if listings.is_empty() {
        return Screen::plain("No open tips.");
    }
    let keyboard = listings.iter().fold(Keyboard::new(), |kb, listing| {
        kb.button(
            format!("{} ({})", listing.tip.booking_code, listing.tipster_name),
            &Callback::TipShow(listing.tip.id),
        )
    });
    Screen::new(format!("OPEN TIPS ({})", listings.len()), keyboard)
}

pub fn tip_detail(listing: &TipListing) -> Screen {
    let tip = &listing.tip;
    Screen::new(
        format!(
            "Tip {}\nBooking code: {}\nTipster: {}\nOdds: {}\nStake: {}",
            tip.id, tip.booking_code, listing.tipster_name, tip.odds, tip.recommended_stake
        ),
        Keyboard::new()
            .button(
                "✅ WIN",
                &Callback::CloseTip {
                    tip_id: tip.id,
                    result: TipResult::Win,
                },
            )
            .button(
                "❌ LOSE",
                &Callback::CloseTip {
                    tip_id: tip.id,
                    result: TipResult::Lose,
                },
            )
            .button("← Back to list", &Callback::TipsBack),
    )
}

pub fn credits(users: &[User], tipsters: &[User]) -> Screen {
    if users.is_empty() && tipsters.is_empty() {
        return Screen::plain("No approved users or tipsters found.");
    }
    let mut text = format!("Users ({})", users.len());
    if !tipsters.is_empty() {
        text.push_str(&format!("\nTipsters ({})", tipsters.len()));
    }
    let keyboard = users.iter().chain(tipsters).fold(Keyboard::new(), |kb, user| {
        kb.button(
            format!("{} ({})", user.display_name(), user.role),
            &Callback::CreditsUser(user.id),
        )
    });
    Screen::new(text, keyboard)
}

pub fn credit_actions(user: &User) -> Screen {
    Screen::new(
        format!("{} ({})\n\nChoose action:", user.display_name(), user.role),
        Keyboard::new()
            .button("➕ Add Credits", &Callback::CreditsAdd(user.id))
            .button("➖ Remove Credits", &Callback::CreditsRemove(user.id))
            .button("🔙 Back to List", &Callback::CreditsBack),
    )
}

pub fn credit_prompt(user: &User, action: CreditAction) -> Screen {
    let example = match action {
        CreditAction::Add => 1000,
        CreditAction::Remove => 500,
    };
    Screen::plain(format!(
        "{}\nEnter amount to {} (e.g. {}):",
        user.display_name(),
        action,
        example
    ))
}

pub fn credit_receipt(receipt: &CreditReceipt) -> String {
    format!(
        "{} credits {}! {}\nNew balance: {:.2}",
        receipt.amount,
        receipt.action.past_tense(),
        receipt.user.display_name(),
        receipt.balance
    )
}

pub fn credit_notice(receipt: &CreditReceipt) -> String {
    format!(
        "{} credits {}! New balance: {:.2}",
        receipt.amount,
        receipt.action.past_tense(),
        receipt.balance
    )
}

pub const NEGATIVE_BALANCE_WARNING: &str = "⚠️ Balance went negative!";

pub fn tip_published(tip: &Tip, audience: usize) -> String {
    format!(
        "✅ Tip {} created!\n📝 Booking: {}\n🎯 Odds: {}\n💰 Recommended stake: {}\n📣 Sent to {} subscribers",
        tip.id, tip.booking_code, tip.odds, tip.recommended_stake, audience
    )
}

pub fn tip_offer(tip: &Tip) -> Screen {
    Screen::new(
        format!(
            "🆕 New tip {}\n📝 Booking Code: {}\n🎯 Odds: {}\n💰 Recommendation: {}",
            tip.id, tip.booking_code, tip.odds, tip.recommended_stake
        ),
        Keyboard::new().row(vec![
            Button::new(
                "✅ I played the tip",
                &Callback::ConfirmBet {
                    tip_id: tip.id,
                    stake: tip.recommended_stake,
                },
            ),
            Button::new("❌ I don't want to play", &Callback::SkipBet(tip.id)),
        ]),
    )
}

pub fn bet_confirmed(confirmation: &BetConfirmation) -> String {
    format!(
        "✅ Tip #{} played with stake {}.\nReserved: {}\n💰 Balance: {:.2}",
        confirmation.bet.tip_id,
        confirmation.bet.stake,
        confirmation.escrow,
        confirmation.bettor_balance
    )
}

pub fn bettor_result(settlement: &Settlement, payout: &Payout) -> String {
    match settlement.result {
        TipResult::Win => format!(
            "🎉 TIP #{} WON ✅\nPayout: +{}\n💰 Your balance: {:.2}",
            settlement.tip_id, payout.amount, payout.balance
        ),
        TipResult::Lose => format!(
            "😞 TIP #{} LOST\nCompensation: +{}\n💰 New balance: {:.2}",
            settlement.tip_id, payout.amount, payout.balance
        ),
    }
}

pub fn tipster_result(settlement: &Settlement) -> String {
    let bets = settlement.payouts.len();
    match settlement.result {
        TipResult::Win => format!(
            "💰 WIN BONUS! 🎉\nTip #{}: +{}\n({} users)\n💵 New balance: {:.2}",
            settlement.tip_id, settlement.tipster_payout, bets, settlement.tipster_balance
        ),
        TipResult::Lose => format!(
            "⚠️ TIP #{} LOST ({} users)\n💰 Your balance: unchanged",
            settlement.tip_id, bets
        ),
    }
}
