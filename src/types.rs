/// Normalized identifying-field values of one row, in configured column order.
/// Example: `["100-234", "Hex bolt M8", "Acme Fasteners"]`
pub type IdentityTuple = Vec<String>;
/// Deterministic id shared by every row with the same identity tuple.
/// Example: `req-sha256-9f86d081884c7d65...`
pub type RequestId = String;
/// Prompt text rendered for one pending row.
pub type PromptText = String;
/// Raw reply text from the conversational agent.
pub type ReplyText = String;
