use std::path::Path;

use crate::errors::{SeeClawError, SeeClawResult};
use crate::skills::types::Skill;

/// `**key: value**` → `(key, value)`.
fn metadata_pair(line: &str) -> Option<(String, String)> {
    let inner = line.strip_prefix("**")?.strip_suffix("**")?;
    let (key, value) = inner.split_once(':')?;
    Some((key.trim().to_lowercase(), value.trim().to_string()))
}

/// Parse one skill file.
///
/// Recognised sections are `# Metadata` (bold `key: value` lines for name,
/// description, role, example) and `# Rules` (one rule per non-empty line,
/// list markers stripped). Everything else stays in the body only.
pub fn parse_skill(id: &str, content: &str) -> SeeClawResult<Skill> {
    let mut skill = Skill {
        id: id.to_string(),
        name: String::new(),
        description: String::new(),
        role: String::new(),
        example: String::new(),
        rules: Vec::new(),
        body: content.to_string(),
    };

    let mut section = String::new();
    for raw in content.lines() {
        let line = raw.trim();
        if let Some(title) = line.strip_prefix("# ") {
            section = title.trim().to_lowercase();
            continue;
        }
        if let Some((key, value)) = metadata_pair(line) {
            match key.as_str() {
                "name" => skill.name = value,
                "description" => skill.description = value,
                "role" => skill.role = value,
                "example" => skill.example = value,
                _ => {}
            }
            continue;
        }
        if section == "rules" && !line.is_empty() {
            let rule = line.trim_start_matches(['-', '*']).trim();
            if !rule.is_empty() {
                skill.rules.push(rule.to_string());
            }
        }
    }

    if skill.name.is_empty() {
        return Err(SeeClawError::Skills(format!("skill '{id}' has no name in its metadata")));
    }
    Ok(skill)
}

/// Load every `*.md` under `dir`, recursively. Unparseable files are skipped
/// with a warning.
pub async fn load_dir(dir: &Path) -> SeeClawResult<Vec<Skill>> {
    if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
        tracing::warn!(dir = %dir.display(), "skills directory does not exist");
        return Ok(Vec::new());
    }
    let mut skills = Vec::new();
    walk(dir, dir, &mut skills).await?;
    skills.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(skills)
}

async fn walk(root: &Path, dir: &Path, out: &mut Vec<Skill>) -> SeeClawResult<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_dir() {
            Box::pin(walk(root, &path, out)).await?;
            continue;
        }
        if path.extension().map_or(true, |ext| ext != "md") {
            continue;
        }
        let id = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .with_extension("")
            .to_string_lossy()
            .replace('\\', "/");
        let content = tokio::fs::read_to_string(&path).await?;
        match parse_skill(&id, &content) {
            Ok(skill) => {
                tracing::debug!(skill = %id, "loaded skill");
                out.push(skill);
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping skill file"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXCEL: &str = "\
# Metadata
**name: Excel chart**
**description: Build a chart from a selected range**
**role: the goal mentions charts or spreadsheets**

# Rules
- Select the data range first
- Use Insert > Chart

# Example
Make a bar chart of column B
";

    #[test]
    fn parses_metadata_and_rules() {
        let skill = parse_skill("office/excel_chart", EXCEL).unwrap();
        assert_eq!(skill.name, "Excel chart");
        assert_eq!(skill.description, "Build a chart from a selected range");
        assert_eq!(skill.rules, vec!["Select the data range first", "Use Insert > Chart"]);
        assert_eq!(skill.category(), "office");
        assert_eq!(skill.body, EXCEL);
    }

    #[test]
    fn nameless_skill_is_rejected() {
        assert!(parse_skill("x", "# Rules\n- a\n").is_err());
    }

    #[tokio::test]
    async fn loads_nested_markdown_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("office")).unwrap();
        std::fs::write(dir.path().join("office/excel_chart.md"), EXCEL).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::write(dir.path().join("broken.md"), "no metadata").unwrap();

        let skills = load_dir(dir.path()).await.unwrap();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].id, "office/excel_chart");
    }

    #[tokio::test]
    async fn missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_dir(&dir.path().join("nope")).await.unwrap().is_empty());
    }
}
