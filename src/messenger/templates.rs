//! Message templates
//!
//! Every user-visible string lives here. Functions are pure: the engine
//! decides who receives what, these only decide how it reads.

use crate::engine::conversation::{DialogState, Prompt, SearchMode, SelectedCounterpart};
use crate::engine::error::DealError;
use crate::engine::model::{
    Affordance, Deal, DealId, DealStatus, DealType, Notice, Role, User, UserId,
};

/// Main menu button labels; the classifier maps them back to commands
pub const LABEL_CREATE_DEAL: &str = "📝 Create Deal";
pub const LABEL_ACTIVE_DEALS: &str = "👥 Active Deals";
pub const LABEL_PROFILE: &str = "📊 My Profile";
pub const LABEL_HELP: &str = "ℹ️ Help";
pub const LABEL_BACK: &str = "↩️ Back to Main Menu";

pub fn main_menu_affordances() -> Vec<Affordance> {
    vec![
        Affordance::new(LABEL_CREATE_DEAL, "/newdeal"),
        Affordance::new(LABEL_ACTIVE_DEALS, "/deals"),
        Affordance::new(LABEL_PROFILE, "/profile"),
        Affordance::new(LABEL_HELP, "/help"),
    ]
}

fn back_affordance() -> Affordance {
    Affordance::new(LABEL_BACK, "main_menu")
}

pub fn msg_welcome_unregistered() -> String {
    "👋 Welcome to DealVault\n\n\
     Negotiate charity, debt, service and venture deals with people you trust.\n\n\
     To get started, share your contact so counterparts can find you by phone."
        .to_string()
}

pub fn msg_request_contact() -> String {
    "📱 Please share your own contact using the button below.".to_string()
}

pub fn share_contact_affordances() -> Vec<Affordance> {
    vec![Affordance::new("📱 Share Contact", "share_contact")]
}

pub fn msg_registered(name: &str) -> String {
    format!(
        "✅ Registration Complete\n\n\
         Welcome, {}! You can now create deals and receive invitations.",
        name
    )
}

pub fn msg_welcome_back(name: &str) -> String {
    format!("👋 Welcome back, {}!\n\nWhat would you like to do?", name)
}

pub fn msg_main_menu(name: &str) -> String {
    format!("🏠 Main Menu\n\nHi {}, what would you like to do?", name)
}

pub fn msg_help() -> String {
    "ℹ️ DealVault Help\n\n\
     /newdeal - Create a new deal\n\
     /deals - List your deals\n\
     /profile - Show your reputation\n\
     /accept <id> - Accept an invitation\n\
     /decline <id> - Decline an invitation\n\
     /chat <id> - Switch your chat to another active deal\n\
     /complete - Complete the deal you are chatting on\n\
     /cancel_deal - Cancel the deal you are chatting on\n\
     /menu - Back to the main menu (discards any draft)\n\n\
     While chatting on a deal, any text you send goes to your counterpart."
        .to_string()
}

pub fn msg_profile(user: &User, open_deals: usize) -> String {
    let phone = user.phone.as_deref().unwrap_or("not shared");
    let username = user
        .username
        .as_deref()
        .map(|u| format!("@{}", u))
        .unwrap_or_else(|| "none".to_string());
    format!(
        "📊 My Profile\n\n\
         Name: {}\n\
         Username: {}\n\
         Phone: {}\n\
         Reputation: {}\n\
         Completed deals: {}\n\
         Open deals: {}",
        user.display_name(),
        username,
        phone,
        user.reputation,
        user.completed_deals,
        open_deals
    )
}

fn status_icon(status: DealStatus) -> &'static str {
    match status {
        DealStatus::Pending => "⏳",
        DealStatus::Active => "🤝",
        DealStatus::Completed => "✅",
        DealStatus::Cancelled => "🚫",
        DealStatus::Expired => "⌛",
    }
}

fn deal_line(deal: &Deal, counterpart: &str) -> String {
    format!(
        "{} {} · {} · {} with {} · {}",
        status_icon(deal.status),
        deal.deal_type.title(),
        format_amount(deal.amount),
        deal.status,
        counterpart,
        deal.id
    )
}

pub fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 && amount.abs() < 1e15 {
        format!("{:.0}", amount)
    } else {
        format!("{}", amount)
    }
}

/// Deal list for `viewer`, each deal paired with its counterpart's name
pub fn deal_list_notice(viewer: &UserId, deals: &[(&Deal, String)]) -> Notice {
    if deals.is_empty() {
        return Notice::reply(viewer, "👥 Active Deals\n\nYou have no open deals.")
            .with_affordances(vec![back_affordance()]);
    }

    let mut text = String::from("👥 Active Deals\n");
    let mut buttons = Vec::new();
    for (deal, counterpart) in deals {
        text.push('\n');
        text.push_str(&deal_line(deal, counterpart));

        match deal.status {
            DealStatus::Pending if deal.is_invited(viewer) && !deal.is_member(viewer) => {
                buttons.push(Affordance::new(
                    format!("✅ Accept {}", deal.deal_type.title()),
                    format!("accept:{}", deal.id),
                ));
                buttons.push(Affordance::new(
                    format!("❌ Decline {}", deal.deal_type.title()),
                    format!("decline:{}", deal.id),
                ));
            }
            DealStatus::Active => {
                buttons.push(Affordance::new(
                    format!("💬 Chat {}", deal.id),
                    format!("/chat {}", deal.id),
                ));
            }
            _ => {}
        }
    }
    buttons.push(back_affordance());
    Notice::reply(viewer, text).with_affordances(buttons)
}

fn deal_summary(deal: &Deal) -> String {
    format!(
        "Type: {}\n\
         Amount: {}\n\
         Terms: {}\n\
         Duration: {} days",
        deal.deal_type.title(),
        format_amount(deal.amount),
        deal.terms,
        deal.duration_days
    )
}

fn search_hint(mode: SearchMode) -> &'static str {
    match mode {
        SearchMode::Username => "Type a username to add a counterpart.",
        SearchMode::Phone => "Type a phone number to add a counterpart.",
        SearchMode::Contact => "Share a contact card to add a counterpart.",
    }
}

fn selection_line(selected: &[SelectedCounterpart]) -> String {
    if selected.is_empty() {
        "Selected: nobody yet".to_string()
    } else {
        let names: Vec<&str> = selected.iter().map(|s| s.name.as_str()).collect();
        format!("Selected: {}", names.join(", "))
    }
}

fn counterpart_affordances(selected: &[SelectedCounterpart]) -> Vec<Affordance> {
    let mut buttons = vec![
        Affordance::new("🔤 By username", "search:username"),
        Affordance::new("📞 By phone", "search:phone"),
        Affordance::new("📇 By contact", "search:contact"),
    ];
    for s in selected {
        buttons.push(Affordance::new(
            format!("✅ {}", s.name),
            format!("toggle:{}", s.id),
        ));
    }
    if !selected.is_empty() {
        buttons.push(Affordance::new("📨 Send invitations", "confirm"));
    }
    buttons.push(back_affordance());
    buttons
}

/// Render a conversation prompt for `recipient`
pub fn prompt_notice(recipient: &UserId, prompt: &Prompt) -> Notice {
    match prompt {
        Prompt::ChooseDealType => {
            let mut buttons: Vec<Affordance> = DealType::ALL
                .iter()
                .map(|t| Affordance::new(t.label(), format!("create_{}", t.canonical())))
                .collect();
            buttons.push(back_affordance());
            Notice::reply(recipient, "📝 New Deal\n\nWhat kind of deal is this?")
                .with_affordances(buttons)
        }
        Prompt::EnterAmount => Notice::reply(recipient, "💵 Enter the amount (a positive number):")
            .with_affordances(vec![back_affordance()]),
        Prompt::EnterTerms => Notice::reply(recipient, "📄 Describe the terms of the deal:")
            .with_affordances(vec![back_affordance()]),
        Prompt::EnterDuration => Notice::reply(recipient, "📅 How many days should the deal run?")
            .with_affordances(vec![back_affordance()]),
        Prompt::ChooseCounterparts { mode, selected } => Notice::reply(
            recipient,
            format!(
                "👥 Choose Counterparts\n\n{}\n{}",
                search_hint(*mode),
                selection_line(selected)
            ),
        )
        .with_affordances(counterpart_affordances(selected)),
        Prompt::CounterpartAdded { name, selected } => Notice::reply(
            recipient,
            format!(
                "➕ Added {}\n\n{}\nAdd more or send the invitations.",
                name,
                selection_line(selected)
            ),
        )
        .with_affordances(counterpart_affordances(selected)),
        Prompt::NoUsersFound { query, selected } => Notice::reply(
            recipient,
            format!(
                "🔍 No users found for \"{}\"\n\nOnly registered users can be invited.\n{}",
                query,
                selection_line(selected)
            ),
        )
        .with_affordances(counterpart_affordances(selected)),
    }
}

pub fn msg_invitation(initiator: &str, deal: &Deal) -> String {
    format!(
        "📨 Deal Invitation\n\n\
         {} invites you to a deal.\n\n\
         {}\n\n\
         Deal: {}",
        initiator,
        deal_summary(deal),
        deal.id
    )
}

pub fn invitation_affordances(deal_id: &DealId) -> Vec<Affordance> {
    vec![
        Affordance::new("✅ Accept", format!("accept:{}", deal_id)),
        Affordance::new("❌ Decline", format!("decline:{}", deal_id)),
    ]
}

pub fn msg_invitations_sent(names: &[String]) -> String {
    format!(
        "📨 Invitations Sent\n\n\
         {} invitation(s) sent to: {}\n\n\
         You'll be connected as soon as someone accepts.",
        names.len(),
        names.join(", ")
    )
}

pub fn chat_affordances() -> Vec<Affordance> {
    vec![
        Affordance::new("✅ Complete Deal", "complete_deal"),
        Affordance::new("🚫 Cancel Deal", "cancel_deal"),
        Affordance::new(LABEL_BACK, "main_menu"),
    ]
}

pub fn msg_chat_header(deal: &Deal, partner: &str, role: Role) -> String {
    format!(
        "🤝 Deal Active\n\n\
         You are chatting with {} as {}.\n\n\
         {}\n\n\
         Everything you type is sent to {}.",
        partner,
        role,
        deal_summary(deal),
        partner
    )
}

/// Sent to an initiator who is busy drafting when a counterpart accepts
pub fn msg_accepted_elsewhere(deal: &Deal, partner: &str) -> String {
    format!(
        "🤝 {} accepted your {} deal.\n\nUse /chat {} to talk to them.",
        partner,
        deal.deal_type.title(),
        deal.id
    )
}

pub fn msg_chat_focused(deal: &Deal, partner: &str) -> String {
    format!(
        "💬 Now chatting with {} on deal {}.",
        partner, deal.id
    )
}

pub fn msg_deal_completed(deal: &Deal) -> String {
    format!(
        "✅ Deal Completed\n\n\
         {} deal {} is complete. Your reputation went up by one.",
        deal.deal_type.title(),
        deal.id
    )
}

pub fn msg_deal_cancelled(deal: &Deal, by: &str) -> String {
    format!(
        "🚫 Deal Cancelled\n\n{} cancelled {} deal {}.",
        by,
        deal.deal_type.title(),
        deal.id
    )
}

pub fn msg_deal_declined(deal: &Deal, by: &str) -> String {
    format!(
        "❌ Invitation Declined\n\n{} declined {} deal {}.",
        by,
        deal.deal_type.title(),
        deal.id
    )
}

pub fn msg_deal_expired(deal: &Deal) -> String {
    format!(
        "⌛ Deal Expired\n\n\
         {} deal {} expired before it was completed.",
        deal.deal_type.title(),
        deal.id
    )
}

/// Relayed chat line; names the deal when the recipient is focused elsewhere
pub fn msg_relay(sender: &str, role: Role, text: &str, other_deal: Option<&DealId>) -> String {
    match other_deal {
        Some(deal_id) => format!("[{}] {} ({}): {}", deal_id, sender, role, text),
        None => format!("{} ({}): {}", sender, role, text),
    }
}

pub fn msg_relay_failed(partner: &str) -> String {
    format!("⚠️ Your message could not be delivered to {}.", partner)
}

pub fn msg_draft_discarded() -> String {
    "↩️ Draft discarded.".to_string()
}

pub fn msg_unrecognized(state: DialogState) -> String {
    match state {
        DialogState::SharingContact => msg_request_contact(),
        _ => "🤔 I didn't understand that. Use the menu or /help.".to_string(),
    }
}

/// Rejection shown to the user for an engine error
pub fn msg_rejection(err: &DealError) -> String {
    let detail = match err {
        DealError::Validation(e) => format!("{}. Please try again.", e),
        DealError::OwnershipMismatch => {
            "That contact is not yours. Please share your own contact.".to_string()
        }
        DealError::NotRegistered => {
            "You need to register first. Send /start and share your contact.".to_string()
        }
        DealError::UserNotFound => "That user could not be found.".to_string(),
        DealError::NoActiveDraft => {
            "There is no deal draft in progress. Use /newdeal to start one.".to_string()
        }
        DealError::NoCounterpartsSelected => {
            "Select at least one counterpart before sending invitations.".to_string()
        }
        DealError::DealNotFound(id) => format!("Deal {} was not found.", id),
        DealError::DealNotMutable { id, status } => {
            format!("Deal {} is already {}.", id, status)
        }
        DealError::InvalidTransition { id, status, event } => {
            format!("Deal {} is {}, so it cannot {}.", id, status, event)
        }
        DealError::NotInvited => "You were not invited to that deal.".to_string(),
        DealError::NotAMember => "You are not a member of that deal.".to_string(),
        DealError::NotInChat => {
            "You are not chatting on a deal. Use /deals to pick one.".to_string()
        }
    };
    format!("❌ {}", detail)
}
