//! Interactive terminal prompts.

use std::io::{self, BufRead, Write};

/// Asks a yes/no question until the answer starts with `y` or `n`.
///
/// End of input counts as "no".
pub fn ask_yes_no<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<bool> {
    loop {
        write!(output, "{} (y/n) ", question)?;
        output.flush()?;

        let mut reply = String::new();
        if input.read_line(&mut reply)? == 0 {
            writeln!(output)?;
            return Ok(false);
        }

        match reply.trim().to_lowercase().chars().next() {
            Some('y') => return Ok(true),
            Some('n') => return Ok(false),
            _ => continue,
        }
    }
}

/// Prints a numbered menu and returns the zero-based index of the choice.
///
/// Returns `None` on end of input or when there is nothing to choose from.
pub fn choose_from_menu<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    choices: &[String],
) -> io::Result<Option<usize>> {
    if choices.is_empty() {
        return Ok(None);
    }

    for (number, choice) in choices.iter().enumerate() {
        writeln!(output, " {}: {}", number + 1, choice)?;
    }
    writeln!(output)?;

    loop {
        write!(output, "Choice: (1-{}) ", choices.len())?;
        output.flush()?;

        let mut reply = String::new();
        if input.read_line(&mut reply)? == 0 {
            writeln!(output)?;
            return Ok(None);
        }

        if let Ok(number) = reply.trim().parse::<usize>() {
            if (1..=choices.len()).contains(&number) {
                writeln!(output, "\n{}", choices[number - 1])?;
                return Ok(Some(number - 1));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn yes_no_retries_until_answered() {
        let mut input = Cursor::new("\nmaybe\nYes\n");
        let mut output = Vec::new();
        assert!(ask_yes_no(&mut input, &mut output, "Proceed?").unwrap());
        assert_eq!(String::from_utf8(output).unwrap().matches("Proceed? (y/n) ").count(), 3);
    }

    #[test]
    fn end_of_input_declines() {
        let mut input = Cursor::new("");
        assert!(!ask_yes_no(&mut input, &mut Vec::new(), "Proceed?").unwrap());
    }

    #[test]
    fn menu_ignores_out_of_range_choices() {
        let choices = vec!["a_RF20".to_string(), "a_RF22".to_string()];
        let mut input = Cursor::new("0\nthree\n2\n");
        let mut output = Vec::new();

        assert_eq!(choose_from_menu(&mut input, &mut output, &choices).unwrap(), Some(1));
        let shown = String::from_utf8(output).unwrap();
        assert!(shown.starts_with(" 1: a_RF20\n 2: a_RF22\n"));
    }

    #[test]
    fn empty_menu_returns_none() {
        let mut input = Cursor::new("1\n");
        assert_eq!(choose_from_menu(&mut input, &mut Vec::new(), &[]).unwrap(), None);
    }
}
