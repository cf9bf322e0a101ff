use anyhow::{bail, Context, Result};
use keypad_matrix::{Layout, Line, Polarity, Pull, Symbol};

/// An owned matrix description, loaded from a keymap file or copied from a
/// built-in layout.
#[derive(Debug, Clone)]
pub struct Keymap {
    pub polarity: Polarity,
    pub rows: Vec<Line>,
    pub columns: Vec<Line>,
    /// `None` where no key sits.
    pub keys: Vec<Vec<Option<String>>>,
}

/// Borrowed symbol table of a [`Keymap`], in the shape [`Layout`] wants.
pub struct Table<'k> {
    cells: Vec<Vec<Option<Symbol<'k>>>>,
}

impl<'k> Table<'k> {
    pub fn rows(&self) -> Vec<&[Option<Symbol<'k>>]> {
        self.cells.iter().map(Vec::as_slice).collect()
    }
}

impl Keymap {
    pub fn from_layout(layout: &Layout<'_>) -> Self {
        Keymap {
            polarity: layout.polarity,
            rows: layout.rows.to_vec(),
            columns: layout.columns.to_vec(),
            keys: layout
                .symbols
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|key| key.map(|symbol| symbol.as_str().to_string()))
                        .collect()
                })
                .collect(),
        }
    }

    pub fn table(&self) -> Table<'_> {
        Table {
            cells: self
                .keys
                .iter()
                .map(|row| row.iter().map(|key| key.as_deref().map(Symbol::new)).collect())
                .collect(),
        }
    }

    pub fn layout<'a>(&'a self, table: &'a [&'a [Option<Symbol<'a>>]]) -> Layout<'a> {
        Layout {
            rows: &self.rows,
            columns: &self.columns,
            symbols: table,
            polarity: self.polarity,
        }
    }

    /// Symbols that appear on more than one key.
    pub fn duplicate_symbols(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        let mut duplicates: Vec<&str> = Vec::new();
        for symbol in self.keys.iter().flatten().flatten() {
            if seen.contains(&symbol.as_str()) {
                if !duplicates.contains(&symbol.as_str()) {
                    duplicates.push(symbol);
                }
            } else {
                seen.push(symbol);
            }
        }
        duplicates
    }
}

/// Parse a keymap file.
///
/// ```text
/// polarity = high          # or low
/// rows = 8 10 12
/// columns = 7 11
/// pull = down              # optional, defaults to what the polarity needs
/// [keys]
/// A B
/// C .                      # "." marks a position without a key
/// D E
/// ```
///
/// Dimensions are not checked here; `Topology::new` does that.
pub fn parse_keymap(input: &str) -> Result<Keymap> {
    let mut polarity: Option<Polarity> = None;
    let mut rows: Option<Vec<u32>> = None;
    let mut columns: Option<Vec<u32>> = None;
    let mut pull: Option<Pull> = None;
    let mut keys: Option<Vec<Vec<Option<String>>>> = None;

    for (line_num, line) in input.lines().enumerate() {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(table) = keys.as_mut() {
            table.push(
                line.split_whitespace()
                    .map(|key| (key != ".").then(|| key.to_string()))
                    .collect(),
            );
            continue;
        }

        if line == "[keys]" {
            keys = Some(Vec::new());
            continue;
        }

        let Some((name, value)) = line.split_once('=') else {
            bail!("line {}: expected `name = value` or `[keys]`", line_num + 1);
        };
        let (name, value) = (name.trim(), value.trim());
        match name {
            "polarity" => {
                if polarity.is_some() {
                    bail!("line {}: polarity given twice", line_num + 1);
                }
                polarity = Some(match value {
                    "high" => Polarity::ActiveHigh,
                    "low" => Polarity::ActiveLow,
                    other => bail!("line {}: unknown polarity `{}`", line_num + 1, other),
                });
            }
            "pull" => {
                if pull.is_some() {
                    bail!("line {}: pull given twice", line_num + 1);
                }
                pull = Some(match value {
                    "down" => Pull::Down,
                    "up" => Pull::Up,
                    "none" => Pull::None,
                    other => bail!("line {}: unknown pull `{}`", line_num + 1, other),
                });
            }
            "rows" | "columns" => {
                let slot = if name == "rows" { &mut rows } else { &mut columns };
                if slot.is_some() {
                    bail!("line {}: {} given twice", line_num + 1, name);
                }
                let ids = parse_ids(value)
                    .with_context(|| format!("line {}: invalid {}", line_num + 1, name))?;
                *slot = Some(ids);
            }
            other => bail!("line {}: unknown setting `{}`", line_num + 1, other),
        }
    }

    let polarity = polarity.unwrap_or_default();
    let pull = pull.unwrap_or(polarity.column_pull());
    let Some(rows) = rows else {
        bail!("missing `rows`");
    };
    let Some(columns) = columns else {
        bail!("missing `columns`");
    };
    let Some(keys) = keys else {
        bail!("missing `[keys]` section");
    };

    Ok(Keymap {
        polarity,
        rows: rows.into_iter().map(Line::drive).collect(),
        columns: columns.into_iter().map(|id| Line::sense(id, pull)).collect(),
        keys,
    })
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(index) => &line[..index],
        None => line,
    }
}

fn parse_ids(value: &str) -> Result<Vec<u32>> {
    let ids = value
        .split_whitespace()
        .map(|id| {
            id.parse::<u32>()
                .with_context(|| format!("`{}` is not a line number", id))
        })
        .collect::<Result<Vec<u32>>>()?;
    if ids.is_empty() {
        bail!("no line numbers");
    }
    Ok(ids)
}
