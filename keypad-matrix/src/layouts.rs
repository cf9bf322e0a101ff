//! Built-in layouts for the keypads this crate was first written for.
//!
//! Both boards sit on a Raspberry Pi header, but their line identifiers use
//! different numbering schemes; each layout says which. Both have a diode per
//! key pointing from row to column, so rows are driven high into pull-down
//! columns.

use crate::line::{Line, Pull};
use crate::topology::{Layout, Polarity, Symbol};

const fn key(label: &'static str) -> Option<Symbol<'static>> {
    Some(Symbol::new(label))
}

const fn col(id: u32) -> Line {
    Line::sense(id, Pull::Down)
}

const LETTER_GAME_ROWS: [Line; 5] = [
    Line::drive(8),
    Line::drive(10),
    Line::drive(12),
    Line::drive(16),
    Line::drive(18),
];

const LETTER_GAME_COLUMNS: [Line; 6] = [col(7), col(11), col(13), col(15), col(19), col(21)];

#[rustfmt::skip]
const LETTER_GAME_SYMBOLS: [&[Option<Symbol<'static>>]; 5] = [
    &[key("A"), key("B"), key("C"), key("D"), key("E"), key("F")],
    &[key("G"), key("H"), key("I"), key("J"), key("K"), key("L")],
    &[key("M"), key("N"), key("O"), key("P"), key("Q"), key("R")],
    &[key("S"), key("T"), key("U"), key("V"), key("W"), key("X")],
    &[key("Y"), key("Z"), key("1"), key("2"), key("3"), key("4")],
];

/// 5×6 letter keypad: A to Z, then 1 to 4.
///
/// Lines are physical header pin numbers (BOARD numbering), not BCM GPIO
/// numbers: rows on pins 8, 10, 12, 16 and 18, columns on pins 7, 11, 13,
/// 15, 19 and 21.
pub const LETTER_GAME: Layout<'static> = Layout {
    rows: &LETTER_GAME_ROWS,
    columns: &LETTER_GAME_COLUMNS,
    symbols: &LETTER_GAME_SYMBOLS,
    polarity: Polarity::ActiveHigh,
};

const DIODE_TEST_ROWS: [Line; 6] = [
    Line::drive(5),
    Line::drive(6),
    Line::drive(13),
    Line::drive(19),
    Line::drive(26),
    Line::drive(22),
];

const DIODE_TEST_COLUMNS: [Line; 5] = [col(12), col(16), col(15), col(21), col(25)];

#[rustfmt::skip]
const DIODE_TEST_SYMBOLS: [&[Option<Symbol<'static>>]; 6] = [
    &[key("A"), key("B"), key("C"), key("D"), key("E")],
    &[key("F"), key("G"), key("H"), key("I"), key("J")],
    &[key("K"), key("L"), key("M"), key("N"), key("O")],
    &[key("P"), key("Q"), key("R"), key("S"), key("T")],
    &[key("U"), key("V"), key("W"), key("X"), key("Y")],
    &[key("Z"), None,     None,     None,     None],
];

/// 6×5 diode test board: A to Z, with only the first position of the last
/// row populated.
///
/// Lines are BCM GPIO numbers: rows on GPIO 5, 6, 13, 19, 26 and 22,
/// columns on GPIO 12, 16, 15, 21 and 25.
pub const DIODE_TEST: Layout<'static> = Layout {
    rows: &DIODE_TEST_ROWS,
    columns: &DIODE_TEST_COLUMNS,
    symbols: &DIODE_TEST_SYMBOLS,
    polarity: Polarity::ActiveHigh,
};

/// Built-in layouts by name.
pub const PRESETS: [(&str, Layout<'static>); 2] =
    [("letter-game", LETTER_GAME), ("diode-test", DIODE_TEST)];

/// Look up a built-in layout by name.
pub fn preset(name: &str) -> Option<Layout<'static>> {
    PRESETS
        .iter()
        .find(|(preset, _)| *preset == name)
        .map(|(_, layout)| *layout)
}
