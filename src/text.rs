// text.rs - Cleanup of host display strings for names and held items.
//
// Host strings carry `§x` format codes and arbitrary unicode. Everything that
// reaches a snapshot is printable ASCII, and held items get a short label
// with a damage suffix for swords.

/// Format-code marker; the character after it is the code.
const FORMAT_MARK: char = '\u{a7}';
const MAX_TEXT: usize = 96;
const MAX_HELD_TEXT: usize = 36;
const MIN_HELD_BASE: usize = 8;
const SHARPNESS_BONUS: f32 = 1.25;
const ITEM_KEYWORDS: &[&str] = &["sword", "axe", "pick", "bow", "rod", "potion", "pearl", "block"];

/// Drop format codes and anything outside printable ASCII, capped at 96
/// characters.
pub fn strip_formatting(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(MAX_TEXT));
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == FORMAT_MARK {
            chars.next();
            continue;
        }
        if c.is_ascii() && !c.is_ascii_control() {
            out.push(c);
            if out.len() == MAX_TEXT {
                break;
            }
        }
    }
    out
}

/// Base attack damage of a vanilla sword from its unlocalized name, 0 when
/// the name is not a known sword.
pub fn sword_damage(unlocalized: &str) -> f32 {
    let u = unlocalized.to_ascii_lowercase();
    if !u.contains("sword") {
        0.0
    } else if u.contains("stone") {
        5.0
    } else if u.contains("iron") {
        6.0
    } else if u.contains("diamond") {
        7.0
    } else if u.contains("wood") || u.contains("gold") {
        4.0
    } else {
        0.0
    }
}

fn normalize_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn looks_like_code(c: u8) -> bool {
    let c = c.to_ascii_lowercase();
    c.is_ascii_digit() || (b'a'..=b'f').contains(&c) || (b'k'..=b'o').contains(&c) || c == b'r'
}

/// Item name without leftover code letters, owner prefixes ("Steve's ") and
/// numeric junk in front.
pub fn cleanup_item_name(raw: &str) -> String {
    let mut clean = normalize_spaces(raw);

    // A code letter glued to the start of a capitalised word: "cDiamond Sword".
    while let [first, second, ..] = *clean.as_bytes() {
        if looks_like_code(first) && (second.is_ascii_uppercase() || second == b'[' || second == b'(') {
            clean = normalize_spaces(&clean[1..]);
        } else {
            break;
        }
    }

    if let Some(p) = clean.to_ascii_lowercase().find("'s ") {
        let right = &clean[p + 3..];
        if p < 20 && ITEM_KEYWORDS.iter().any(|k| right.to_ascii_lowercase().contains(k)) {
            clean = right.to_string();
        }
    }

    let mut rest = clean.trim_start_matches(|c: char| !c.is_ascii_alphanumeric());
    while rest.starts_with(|c: char| c.is_ascii_digit()) {
        match rest.find(|c: char| c.is_ascii_alphabetic()) {
            Some(p) => rest = rest[p..].trim_start_matches(|c: char| !c.is_ascii_alphanumeric()),
            None => break,
        }
    }
    normalize_spaces(rest)
}

fn roman_digit(c: char) -> u32 {
    match c.to_ascii_lowercase() {
        'i' => 1,
        'v' => 5,
        'x' => 10,
        'l' => 50,
        'c' => 100,
        'd' => 500,
        'm' => 1000,
        _ => 0,
    }
}

/// Value of a roman numeral, 0 when `token` is empty or not a numeral.
pub fn parse_roman(token: &str) -> u32 {
    let mut total = 0u32;
    let mut prev = 0;
    for c in token.chars().rev() {
        let v = roman_digit(c);
        if v == 0 {
            return 0;
        }
        if v < prev {
            total = total.saturating_sub(v);
        } else {
            total += v;
        }
        prev = v;
    }
    total
}

fn leading_number(s: &str) -> u32 {
    let digits = s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    s[..digits].parse().unwrap_or(0)
}

/// Sharpness level named in an item label: "Sharpness III", "sharpness 4"
/// or a bare "Sword 2".
pub fn sharpness_level(label: &str) -> u32 {
    let lower = label.to_ascii_lowercase();
    if let Some(p) = lower.find("sharpness") {
        let rest = lower[p + "sharpness".len()..].trim_start_matches(|c: char| !c.is_ascii_alphanumeric());
        let level = if rest.starts_with(|c: char| c.is_ascii_digit()) {
            leading_number(rest)
        } else {
            let end = rest.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(rest.len());
            parse_roman(&rest[..end])
        };
        if level > 0 {
            return level;
        }
    }
    lower
        .find("sword")
        .map(|p| leading_number(lower[p + "sword".len()..].trim_start_matches(' ')))
        .unwrap_or(0)
}

/// Cleaned base name plus a " (7.0 dmg)" suffix when `damage` is positive,
/// shortened with "..." to fit the label width.
pub fn capped_held_text(raw: &str, damage: f32) -> String {
    let mut base = cleanup_item_name(raw);
    if base.is_empty() {
        base = "Item".into();
    }
    let suffix = if damage > 0.0 { format!(" ({damage:.1} dmg)") } else { String::new() };
    let allowed = MAX_HELD_TEXT.saturating_sub(suffix.len()).max(MIN_HELD_BASE);
    if base.chars().count() > allowed {
        base = base.chars().take(allowed - 3).collect::<String>() + "...";
    }
    base + &suffix
}

/// Snapshot label for a held stack. Swords get their damage, raised by any
/// sharpness level the display name mentions.
pub fn held_item_text(display: &str, unlocalized: Option<&str>) -> String {
    let raw = strip_formatting(display);
    let mut damage = 0.0;
    if raw.to_ascii_lowercase().contains("sword") {
        damage = unlocalized.map_or(0.0, sword_damage);
        let level = sharpness_level(&raw);
        if level > 0 {
            damage += SHARPNESS_BONUS * level as f32;
        }
    }
    capped_held_text(&raw, damage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_codes_and_non_ascii_are_dropped() {
        assert_eq!(strip_formatting("\u{a7}cAlex\u{a7}r"), "Alex");
        assert_eq!(strip_formatting("\u{a7}l\u{a7}6VIP \u{2605} Sam\n"), "VIP  Sam");
        assert_eq!(strip_formatting("trailing\u{a7}"), "trailing");
        assert_eq!(strip_formatting(&"x".repeat(200)).len(), 96);
    }

    #[test]
    fn sword_tiers() {
        assert_eq!(sword_damage("item.swordDiamond"), 7.0);
        assert_eq!(sword_damage("item.swordIron"), 6.0);
        assert_eq!(sword_damage("item.swordStone"), 5.0);
        assert_eq!(sword_damage("item.swordWood"), 4.0);
        assert_eq!(sword_damage("item.swordGold"), 4.0);
        assert_eq!(sword_damage("item.pickaxeDiamond"), 0.0);
        assert_eq!(sword_damage("item.swordEmerald"), 0.0);
    }

    #[test]
    fn cleanup_removes_glued_codes_owners_and_junk() {
        assert_eq!(cleanup_item_name("  cDiamond   Sword "), "Diamond Sword");
        assert_eq!(cleanup_item_name("Steve's Iron Sword"), "Iron Sword");
        assert_eq!(cleanup_item_name("Steve's Lucky Charm"), "Steve's Lucky Charm");
        assert_eq!(cleanup_item_name("7( Bow"), "Bow");
        assert_eq!(cleanup_item_name("3 - Ender Pearl"), "Ender Pearl");
        assert_eq!(cleanup_item_name("64"), "64");
        assert_eq!(cleanup_item_name("Bow"), "Bow");
    }

    #[test]
    fn roman_numerals() {
        assert_eq!(parse_roman("iii"), 3);
        assert_eq!(parse_roman("IV"), 4);
        assert_eq!(parse_roman("ix"), 9);
        assert_eq!(parse_roman(""), 0);
        assert_eq!(parse_roman("iz"), 0);
    }

    #[test]
    fn sharpness_from_label() {
        assert_eq!(sharpness_level("Diamond Sword Sharpness III"), 3);
        assert_eq!(sharpness_level("sharpness: 5"), 5);
        assert_eq!(sharpness_level("Iron Sword 2"), 2);
        assert_eq!(sharpness_level("Iron Sword"), 0);
        assert_eq!(sharpness_level("Sharpness"), 0);
    }

    #[test]
    fn held_text_adds_damage_for_swords() {
        assert_eq!(held_item_text("Diamond Sword", Some("item.swordDiamond")), "Diamond Sword (7.0 dmg)");
        assert_eq!(
            held_item_text("\u{a7}bDiamond Sword Sharpness II", Some("item.swordDiamond")),
            "Diamond Sword Sharpness II (9.5 dmg)"
        );
        assert_eq!(held_item_text("Diamond Sword", None), "Diamond Sword");
        assert_eq!(held_item_text("Bow", Some("item.bow")), "Bow");
        assert_eq!(held_item_text("\u{a7}7", None), "Item");
    }

    #[test]
    fn long_labels_are_shortened_to_fit() {
        let text = capped_held_text("Extraordinarily Long Enchanted Diamond Sword", 7.0);
        assert_eq!(text, "Extraordinarily Long En... (7.0 dmg)");
        assert_eq!(text.len(), MAX_HELD_TEXT);
        let plain = capped_held_text(&"Wool ".repeat(10), 0.0);
        assert_eq!(plain.len(), MAX_HELD_TEXT);
        assert!(plain.ends_with("..."));
    }
}
