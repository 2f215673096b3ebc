//! Fixed prompt text and the quick-prompt catalogue.

use serde::Serialize;

/// System instruction sent with every backend request. It asks the model to
/// emit the `ALERTE:`, `Crowding:`, `Cost:` and `Access:` tags the extractor
/// reads.
pub const SYSTEM_INSTRUCTION: &str = r#"You are "LondonWay", the ultimate London transport guide. You help users navigate the city's complexity with ease.

CORE RESPONSIBILITIES:
1. COST ESTIMATION: For any journey, estimate the fare (e.g., £2.80 Off-peak / £3.40 Peak). Remind them of the daily cap for the zones traveled.
2. ACCESSIBILITY: Proactively identify if a route is "Step-free", has "Partial access", or is "Complex" (lots of stairs). Mention lift availability if searched.
3. NETWORK CLARITY: Proactively solve "confusion points". Examples:
   - Explain the Bank/Monument 10-minute walk.
   - Clarify Northern Line branches (Bank vs Charing Cross).
   - Note that Paddington Elizabeth Line is separate from the main station.
4. OYSTER/CONTACTLESS: Always assume they are using one of these. Explain "Card Clash" if relevant.

FORMATTING REQUIREMENTS:
- Use bold for **Stations** and **Lines**.
- Start disruptions with: "ALERTE: [Line] - [Status]".
- Include these metadata tags at the end or within text:
  - "Crowding: [Low/Moderate/High]"
  - "Cost: [Estimate text]"
  - "Access: [Step-free/Partial/Complex]"

Be concise, reassuring, and expert. Londoners hate fluff but love efficiency."#;

pub const GREETING_PROMPT: &str = "Greet the user as LondonWay. Mention one interesting transit fact about fares or accessibility today to help them start.";

/// Used when the greeting request fails or comes back empty.
pub const FALLBACK_GREETING: &str = "Welcome to LondonWay. How can I help you navigate the city today?";

/// Appended to a prompt retried without web search.
pub const BASIC_MODE_SUFFIX: &str = " (Basic mode)";

/// Network status line shown before any alert has been extracted.
pub const INITIAL_NETWORK_STATUS: &str = "Checking London transport status...";

pub fn favorite_route_prompt(label: &str) -> String {
    format!("Plan route: {label}")
}

/// One-tap prompts offered alongside the input box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum QuickPrompt {
    StepFree,
    FareCheck,
    BankTips,
}

impl QuickPrompt {
    pub fn all() -> [QuickPrompt; 3] {
        [QuickPrompt::StepFree, QuickPrompt::FareCheck, QuickPrompt::BankTips]
    }

    pub fn label(&self) -> &'static str {
        match self {
            QuickPrompt::StepFree => "Step-free",
            QuickPrompt::FareCheck => "Fare Check",
            QuickPrompt::BankTips => "Bank Tips",
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            QuickPrompt::StepFree => "Show me step-free routes to King's Cross",
            QuickPrompt::FareCheck => "How much is a fare from Zone 1 to Zone 3?",
            QuickPrompt::BankTips => "Explain Bank station interchange",
        }
    }
}

impl std::fmt::Display for QuickPrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
