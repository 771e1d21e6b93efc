use ammonia;

/// Sanitizes authored question text with ammonia's whitelist.
///
/// Safe inline markup (<b>, <code>, <p>) survives; <script>, <iframe> and
/// event-handler attributes are stripped together with their content.
/// Students render question text and options as HTML, so this runs before
/// anything is stored.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
