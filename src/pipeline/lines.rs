//! Line heuristics: raw OCR text → menu item candidates.
//!
//! A single forward pass over trimmed, non-empty lines. Lines without a price
//! accumulate in a buffer; a line with a price closes the buffer and is split
//! into name, price and trailing description.
//!
//! When the priced line has nothing before its price (`$12.99 comes with
//! fries`), the buffered lines are that item's name. Otherwise the buffer is
//! emitted on its own as a name-only item. This deliberately departs from a
//! strict flush-before-split order, which would drop the nameless priced item.
//!
//! Digits are ASCII only: OCR noise in other scripts is not a price.

use crate::menu::MenuItemCandidate;
use once_cell::sync::Lazy;
use regex::Regex;

/// Optional `$`, one to three digits, optional `.`/`,` plus two digits.
static RE_PRICE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$?[0-9]{1,3}(?:[.,][0-9]{2})?").unwrap());

/// name, optional separator, price, rest.
static RE_SPLIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*?)(?:\s+[-:.]?\s*)?(\$?[0-9]{1,3}(?:[.,][0-9]{2})?)\s*(.*)$").unwrap()
});

/// `true` if the line contains something that looks like a price.
pub fn contains_price(line: &str) -> bool {
    RE_PRICE.is_match(line)
}

/// Parse OCR text into candidates. Empty input gives an empty list.
pub fn parse_menu_lines(text: &str) -> Vec<MenuItemCandidate> {
    let mut items = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if !contains_price(line) {
            buffer.push(line);
            continue;
        }

        let Some(caps) = RE_SPLIT.captures(line) else {
            flush(&mut buffer, &mut items);
            // Price and description are lost here; the whole line is the name.
            items.push(MenuItemCandidate::new(line));
            continue;
        };

        let name = caps.get(1).map_or("", |m| m.as_str()).trim();
        let price = caps.get(2).map_or("", |m| m.as_str());
        let rest = caps.get(3).map_or("", |m| m.as_str());

        let name = if name.is_empty() && !buffer.is_empty() {
            let joined = buffer.join(" ");
            buffer.clear();
            joined
        } else {
            flush(&mut buffer, &mut items);
            name.to_string()
        };

        items.push(
            MenuItemCandidate::new(name)
                .with_price(price)
                .with_description(rest),
        );
    }
    flush(&mut buffer, &mut items);

    items.retain(|item| !item.name.is_empty());
    items
}

fn flush(buffer: &mut Vec<&str>, items: &mut Vec<MenuItemCandidate>) {
    if !buffer.is_empty() {
        items.push(MenuItemCandidate::new(buffer.join(" ")));
        buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[MenuItemCandidate]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(parse_menu_lines("").is_empty());
        assert!(parse_menu_lines("  \n\n \t\n").is_empty());
    }

    #[test]
    fn buffered_lines_name_the_following_price() {
        let items = parse_menu_lines("Cheeseburger\n$12.99 comes with fries\nSalad\n$8");
        assert_eq!(
            items,
            vec![
                MenuItemCandidate::new("Cheeseburger")
                    .with_price("$12.99")
                    .with_description("comes with fries"),
                MenuItemCandidate::new("Salad").with_price("$8"),
            ]
        );
    }

    #[test]
    fn single_line_with_separator() {
        let items = parse_menu_lines("Fish Tacos - $11.50 two corn tortillas");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Fish Tacos");
        assert_eq!(items[0].price.as_deref(), Some("$11.50"));
        assert_eq!(items[0].description.as_deref(), Some("two corn tortillas"));
    }

    #[test]
    fn description_omitted_when_empty() {
        let items = parse_menu_lines("Soup 6");
        assert_eq!(items, vec![MenuItemCandidate::new("Soup").with_price("6")]);
        let json = serde_json::to_value(&items[0]).unwrap();
        assert!(json.get("description").is_none());
    }

    #[test]
    fn named_price_line_flushes_buffer_separately() {
        let items = parse_menu_lines("STARTERS\nWings 9.99\nFries 4");
        assert_eq!(names(&items), vec!["STARTERS", "Wings", "Fries"]);
        assert_eq!(items[0].price, None);
    }

    #[test]
    fn consecutive_plain_lines_merge() {
        let items = parse_menu_lines("House Special\nslow cooked\nwith herbs");
        assert_eq!(names(&items), vec!["House Special slow cooked with herbs"]);
    }

    #[test]
    fn non_ascii_digits_are_not_prices() {
        assert!(!contains_price("Chai ١٢"));
        assert!(!contains_price("Ramen １２"));
        let items = parse_menu_lines("Tea\nChai ١٢");
        assert_eq!(items, vec![MenuItemCandidate::new("Tea Chai ١٢")]);
    }

    #[test]
    fn trailing_buffer_is_flushed() {
        let items = parse_menu_lines("Pie 5\nAsk your server");
        assert_eq!(names(&items), vec!["Pie", "Ask your server"]);
    }

    #[test]
    fn lone_price_without_buffer_is_dropped() {
        assert!(parse_menu_lines("$8").is_empty());
    }

    #[test]
    fn no_price_lines_give_at_most_one_joined_item() {
        let inputs = ["a", " a \n b ", "Menu\n\nDrinks\n  Desserts  ", "", "\n"];
        for input in inputs {
            let items = parse_menu_lines(input);
            let joined = input
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if joined.is_empty() {
                assert!(items.is_empty(), "input {input:?}");
            } else {
                assert_eq!(names(&items), vec![joined.as_str()], "input {input:?}");
            }
        }
    }

    #[test]
    fn item_count_bounded_by_line_count() {
        let inputs = [
            "Cheeseburger\n$12.99 comes with fries\nSalad\n$8",
            "1\n2\n3",
            "A\nB 4\nC\nD\n$5\nE",
            "Open 7 days\nBrunch 10-2",
            "$1\n$2\nTea",
        ];
        for input in inputs {
            let lines = input.lines().filter(|l| !l.trim().is_empty()).count();
            let items = parse_menu_lines(input);
            assert!(items.len() <= lines, "input {input:?} gave {items:?}");
            assert!(items.iter().all(|i| !i.name.is_empty()));
        }
    }

    #[test]
    fn price_detection() {
        assert!(contains_price("Burger $9"));
        assert!(contains_price("12,50"));
        assert!(!contains_price("Chef's choice"));
    }
}
