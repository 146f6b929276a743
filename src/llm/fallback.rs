//! Rule-based replies used while the model is unavailable.

use regex::Regex;

use crate::core::errors::AgentResult;

/// Reply to greetings.
pub const GREETING_REPLY: &str =
    "Hello! I'm your BigBikeBlitz AI assistant. How can I help you with motorcycles today?";

/// Reply when no rule matches.
pub const DEFAULT_REPLY: &str = "BigBikeBlitz is your destination for premium motorcycles \
from BMW, Honda, Yamaha and Kawasaki, with financing, warranty coverage and delivery \
options. Ask me about a model, its price or our services and I'll do my best to help.";

const RULES: [(&str, &str); 6] = [
    (
        r"\b(hello|hi|hey|greetings|good (morning|afternoon|evening))\b",
        GREETING_REPLY,
    ),
    (
        r"\b(financ\w*|loan|loans|apr|installments?|monthly payments?)\b",
        "BigBikeBlitz offers financing with competitive rates starting at 3.9% APR on \
select models. Our team can help you choose a plan that fits your budget.",
    ),
    (
        r"\b(warrant\w*|guarantee\w*|coverage)\b",
        "Every new motorcycle at BigBikeBlitz comes with a manufacturer warranty, from 1 \
year up to 3 years of unlimited mileage coverage depending on the brand.",
    ),
    (
        r"\b(deliver\w*|shipping|ship|pickup|pick up)\b",
        "BigBikeBlitz can deliver your motorcycle to your door or prepare it for pickup \
at our showroom. Contact us for delivery times and costs in your area.",
    ),
    (
        r"\b(bmw|honda|yamaha|kawasaki|ducati|suzuki|triumph|ktm)\b",
        "We carry models from BMW, Honda, Yamaha and Kawasaki, including the BMW S1000 RR, \
BMW R1250 GS, Honda CBR1000RR-R Fireblade, Yamaha YZF-R1 and Kawasaki Ninja ZX-10R.",
    ),
    (
        r"\b(price|prices|pricing|cost|costs|how much|cheap\w*|budget)\b",
        "Our superbikes range from $16,599 for the Kawasaki Ninja ZX-10R to $18,895 for the \
BMW R1250 GS. Ask about a specific model for its full specifications.",
    ),
];

/// Ordered keyword rules over the lowercased query; the first match wins.
#[derive(Clone, Debug)]
pub struct FallbackResponder {
    rules: Vec<(Regex, &'static str)>,
}

impl FallbackResponder {
    /// Compile the built-in rule table.
    ///
    /// # Errors
    /// Returns an error if a rule pattern fails to compile.
    pub fn new() -> AgentResult<Self> {
        let rules = RULES
            .iter()
            .map(|(pattern, reply)| Ok((Regex::new(pattern)?, *reply)))
            .collect::<AgentResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Reply for `query`.
    #[must_use]
    pub fn respond(&self, query: &str) -> &'static str {
        let lowered = query.to_lowercase();
        self.rules
            .iter()
            .find(|(pattern, _)| pattern.is_match(&lowered))
            .map_or(DEFAULT_REPLY, |(_, reply)| *reply)
    }
}
