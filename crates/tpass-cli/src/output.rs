use comfy_table::Table;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;

use tpass_core::vault::{Entry, EntryId, Tag, TagId, Vault};

/// Placeholder printed instead of secrets.
pub const MASK: &str = "********";

/// Create a styled table for output
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);
    table
}

/// Comma-separated tag titles of an entry.
pub fn tag_titles(vault: &Vault, entry: &Entry) -> String {
    entry
        .tags
        .iter()
        .map(|id| {
            vault
                .tags
                .get(id)
                .map_or_else(|| format!("#{id}"), |t| t.title.clone())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn entries_table<'a>(
    vault: &Vault,
    entries: impl IntoIterator<Item = (EntryId, &'a Entry)>,
) -> Table {
    let mut table = create_table();
    table.set_header(vec!["ID", "Item/URL", "Title", "Username", "Tags"]);
    for (id, entry) in entries {
        table.add_row(vec![
            format!("#{id}"),
            entry.note.clone(),
            entry.title.clone(),
            entry.username.clone(),
            tag_titles(vault, entry),
        ]);
    }
    table
}

pub fn tags_table<'a>(tags: impl IntoIterator<Item = (TagId, &'a Tag)>) -> Table {
    let mut table = create_table();
    table.set_header(vec!["ID", "Tag", "Icon"]);
    for (id, tag) in tags {
        table.add_row(vec![format!("#{id}"), tag.title.clone(), tag.icon.to_string()]);
    }
    table
}

/// Multi-line entry card. `entry` must be open when `reveal` is set.
pub fn entry_card(vault: &Vault, id: EntryId, entry: &Entry, reveal: bool) -> String {
    let secret = |field: &tpass_core::vault::SecretField| {
        if reveal {
            field.as_plain().unwrap_or(MASK).to_owned()
        } else {
            MASK.to_owned()
        }
    };
    format!(
        "#{id}\nitem/url*: {}\ntitle:     {}\nusername:  {}\npassword:  {}\nsecret:    {}\ntags:      {}",
        entry.note,
        entry.title,
        entry.username,
        secret(&entry.password),
        secret(&entry.safe_note),
        tag_titles(vault, entry),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpass_core::vault::Icon;

    #[test]
    fn test_entry_card_masks_secrets() {
        let mut vault = Vault::new();
        vault.tags.insert(TagId(1), Tag::new("Work", Icon::Card));
        let mut entry = Entry::open("github.com", "GitHub", "octocat", "hunter2", "note");
        entry.tags.insert(TagId(1));
        entry.tags.insert(TagId(7));

        let masked = entry_card(&vault, EntryId(3), &entry, false);
        assert!(masked.starts_with("#3\n"));
        assert!(!masked.contains("hunter2"));
        assert!(masked.contains("tags:      Work, #7"));

        let shown = entry_card(&vault, EntryId(3), &entry, true);
        assert!(shown.contains("password:  hunter2"));
    }
}
