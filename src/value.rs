/// Payload a test coroutine hands back on completion. A passing test usually
/// returns `Val::None`; helpers like the scoreboard attach a summary string.
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    None,
    Int(i64),
    Float(f64),
    String(String),
    Vec(Vec<Val>),
}
