//! Customer-facing message texts.

use quitute_core::CustomerEmail;
use quitute_inventory::Item;

use super::OutboundMessage;

/// "Your item is available, come pick it up", sent when an availability
/// check finds stock.
pub fn pickup_notice(topic: &str, recipient: &CustomerEmail, item: &Item) -> OutboundMessage {
    OutboundMessage {
        topic: topic.to_string(),
        recipient: Some(recipient.clone()),
        subject: format!("{} is available", item.name()),
        body: format!(
            "Good news! {} is available right now ({} in stock). \
             Come by the bakery to pick it up.",
            item.name(),
            item.stock_quantity()
        ),
    }
}

/// "The item you asked about is back", sent by the dispatcher after a restock.
pub fn back_in_stock(topic: &str, recipient: &CustomerEmail, item: &Item) -> OutboundMessage {
    OutboundMessage {
        topic: topic.to_string(),
        recipient: Some(recipient.clone()),
        subject: format!("{} is back in stock", item.name()),
        body: format!(
            "You asked us to let you know: {} is back in stock ({} available). \
             Reserve yours before it sells out again.",
            item.name(),
            item.stock_quantity()
        ),
    }
}
