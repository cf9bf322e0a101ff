use anyhow::{bail, Context, Result};
use keypad_matrix::sim::{Contact, SimMatrix};
use keypad_matrix::{Coord, Instant, Topology};

/// Scripted key activity for a replay.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Script {
    pub contacts: Vec<Contact>,
    /// Columns forced to the pressed level: (column, from).
    pub stuck: Vec<(usize, Instant)>,
}

impl Script {
    /// Check every position against the topology and load the script into
    /// the simulated matrix.
    pub fn apply(&self, topology: &Topology<'_>, sim: &SimMatrix) -> Result<()> {
        for contact in &self.contacts {
            if !topology.contains(contact.coord) {
                bail!("contact at {} is outside the matrix", contact.coord);
            }
            sim.add_contact(*contact);
        }
        for &(col, from) in &self.stuck {
            if col >= topology.columns().len() {
                bail!("stuck column {} is outside the matrix", col);
            }
            sim.stick_column(col, from);
        }
        Ok(())
    }

    /// Instant after which nothing in the script changes anymore.
    pub fn last_change(&self) -> Instant {
        let contacts = self
            .contacts
            .iter()
            .map(|contact| contact.until.unwrap_or(contact.from));
        let stuck = self.stuck.iter().map(|(_, from)| *from);
        contacts
            .chain(stuck)
            .max()
            .unwrap_or(Instant::from_ticks(0))
    }
}

/// Parse a press script.
///
/// ```text
/// # row col from_ms [until_ms]
/// 2 3 0 400
/// 0 0 1000          # never released
/// stuck 4 2500      # column 4 shorted from 2.5 s on
/// ```
pub fn parse_script(input: &str) -> Result<Script> {
    let mut script = Script::default();

    for (line_num, line) in input.lines().enumerate() {
        let line = match line.find('#') {
            Some(index) => &line[..index],
            None => line,
        };
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }

        let number = |index: usize| -> Result<u64> {
            fields[index]
                .parse::<u64>()
                .with_context(|| format!("line {}: `{}` is not a number", line_num + 1, fields[index]))
        };

        match fields.as_slice() {
            ["stuck", _, _] => {
                let col = number(1)? as usize;
                script.stuck.push((col, millis(number(2)?)));
            }
            ["stuck", ..] => bail!("line {}: expected `stuck <col> <from_ms>`", line_num + 1),
            [_, _, _] | [_, _, _, _] => {
                let coord = Coord::new(number(0)? as usize, number(1)? as usize);
                let from = millis(number(2)?);
                let contact = if fields.len() == 4 {
                    let until = millis(number(3)?);
                    if until <= from {
                        bail!("line {}: contact ends before it starts", line_num + 1);
                    }
                    Contact::between(coord, from, until)
                } else {
                    Contact::held(coord, from)
                };
                script.contacts.push(contact);
            }
            _ => bail!(
                "line {}: expected `<row> <col> <from_ms> [<until_ms>]`",
                line_num + 1
            ),
        }
    }

    Ok(script)
}

fn millis(ms: u64) -> Instant {
    Instant::from_ticks(ms.saturating_mul(1000))
}
