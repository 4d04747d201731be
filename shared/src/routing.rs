/// Last non-empty path segment, so `/prod/photo/` and `/photo` route alike.
pub fn last_segment(path: &str) -> &str {
    path.split('/').filter(|s| !s.is_empty()).last().unwrap_or_default()
}
