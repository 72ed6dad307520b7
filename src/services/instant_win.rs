//! 即开奖判定
//!
//! Matching is a pure function of the ticket number and the prize table so it
//! can run before the claim is attempted and be replayed at will.

use crate::models::{InstantWinGroup, PrizeDescriptor, Ticket, WinResult};

/// Returns the first prize in list order whose winning numbers contain `ticket_number`.
pub fn resolve(ticket_number: i64, prizes: &[PrizeDescriptor]) -> Option<WinResult> {
    prizes
        .iter()
        .find(|p| p.winning_numbers.contains(&ticket_number))
        .map(|p| WinResult {
            label: p.label.clone(),
            amount: p.amount,
            wallet_type: p.wallet_type,
        })
}

/// Groups winning tickets by prize label, labels in first-seen order, numbers ascending.
pub fn group_instant_wins(tickets: &[Ticket]) -> Vec<InstantWinGroup> {
    let mut groups: Vec<InstantWinGroup> = Vec::new();
    for ticket in tickets {
        let Some(win) = &ticket.win else {
            continue;
        };
        match groups.iter_mut().find(|g| g.prize == win.label) {
            Some(group) => group.ticket_numbers.push(ticket.ticket_number),
            None => groups.push(InstantWinGroup {
                prize: win.label.clone(),
                ticket_numbers: vec![ticket.ticket_number],
            }),
        }
    }
    for group in &mut groups {
        group.ticket_numbers.sort_unstable();
    }
    groups
}
