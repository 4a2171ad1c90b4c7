//! Menu shown for greetings, unclear messages and failed turns

use crate::state_machine::FlowReply;

const GREETING: &str = "Hi! I'm Robbie, your photography business assistant. I can help you with:\n\n\
    📸 **Shoots**: book, reschedule or cancel shoots and check availability\n\
    👥 **Team and clients**: assign photographers, client history and follow-ups\n\
    💳 **Billing and delivery**: invoices, discounts, galleries and downloads\n\
    📊 **Reports and help**: accounting summaries, client stats and FAQs\n\n\
    What would you like to do?";

const DEFAULT_SUGGESTIONS: [&str; 6] = [
    "Book a new shoot",
    "Assign photographer",
    "Create invoice",
    "Share gallery",
    "View outstanding invoices",
    "Help & FAQ",
];

/// Page of the studio app, its intro line and its quick replies
struct PageMenu {
    page: &'static str,
    intro: &'static str,
    suggestions: &'static [&'static str],
}

const PAGE_MENUS: &[PageMenu] = &[
    PageMenu {
        page: "dashboard",
        intro: "Here's what I can do from your dashboard:",
        suggestions: &["Book a new shoot", "Manage a booking", "Check availability", "Accounting summary"],
    },
    PageMenu {
        page: "shoot_history",
        intro: "Looking through your shoots? I can help with:",
        suggestions: &["Manage a booking", "Check delivery status", "Request reshoot", "Book a new shoot"],
    },
    PageMenu {
        page: "shoot_details",
        intro: "I can help with this shoot:",
        suggestions: &["Manage booking", "Share gallery", "Download all photos", "Request reshoot"],
    },
    PageMenu {
        page: "book_shoot",
        intro: "Ready to book? I'll walk you through it.",
        suggestions: &["Book a new shoot", "Check availability"],
    },
    PageMenu {
        page: "availability",
        intro: "I can check open slots or update a photographer's calendar:",
        suggestions: &["Check availability", "Book a new shoot", "Update photographer availability"],
    },
    PageMenu {
        page: "accounting",
        intro: "Here's what I can do with your numbers:",
        suggestions: &["Accounting summary", "View outstanding invoices", "Create invoice", "Client stats"],
    },
    PageMenu {
        page: "invoices",
        intro: "I can help with invoices:",
        suggestions: &["Create invoice", "Send invoice", "View outstanding invoices", "Apply discount"],
    },
    PageMenu {
        page: "ai_editing",
        intro: "I can help get edited media to your clients:",
        suggestions: &["Check delivery status", "Share gallery", "Download all photos"],
    },
    PageMenu {
        page: "reports",
        intro: "Here are the reports I can pull:",
        suggestions: &["Accounting summary", "My stats", "View at-risk clients", "Photographer earnings"],
    },
    PageMenu {
        page: "settings",
        intro: "Need a hand?",
        suggestions: &["Help & FAQ", "Speak to a human"],
    },
];

/// Greeting menu, tailored to the page the user is on when there is one
pub fn fallback_reply(page: Option<&str>) -> FlowReply {
    let menu = page.and_then(|page| {
        let page = page.trim().to_ascii_lowercase();
        PAGE_MENUS.iter().find(|m| m.page == page)
    });
    match menu {
        Some(menu) => FlowReply::say(format!(
            "Hi! I'm Robbie, your photography business assistant. {}",
            menu.intro
        ))
        .with_metadata("type", "system")
        .with_suggestions(menu.suggestions.iter().copied()),
        None => FlowReply::say(GREETING)
            .with_metadata("type", "system")
            .with_suggestions(DEFAULT_SUGGESTIONS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{route_chip, Intent};

    #[test]
    fn test_default_menu() {
        let reply = fallback_reply(None);
        assert!(reply.is_well_formed());
        assert!(reply.messages[0].content.starts_with("Hi! I'm Robbie"));
        assert_eq!(reply.messages[0].metadata["type"], "system");
        assert_eq!(reply.suggestions, DEFAULT_SUGGESTIONS);
        assert_eq!(fallback_reply(Some("no_such_page")), reply);
    }

    #[test]
    fn test_page_menu() {
        let reply = fallback_reply(Some("Invoices"));
        assert!(reply.messages[0].content.contains("I can help with invoices"));
        assert_eq!(reply.suggestions[0], "Create invoice");
    }

    #[test]
    fn test_every_menu_suggestion_routes_somewhere() {
        let all = PAGE_MENUS
            .iter()
            .flat_map(|m| m.suggestions.iter())
            .chain(DEFAULT_SUGGESTIONS.iter());
        for suggestion in all {
            let routed = route_chip(suggestion);
            assert!(
                routed.is_some_and(|i| i != Intent::General),
                "{suggestion} is not a chip"
            );
        }
    }
}
