use crate::text::{Line, Text};

/* Preprocessor

Reads through the input:
- removes comments
- collapses runs of whitespace (except inside string literals)
- moves labels onto the same line as the statement they precede
*/

/// Preprocesses `source` into a line buffer. Lines keep the number of the
/// physical line they started on; a spliced label keeps the label's line.
pub fn preprocess(source: &str, filename: &str) -> Text {
    let chars: Vec<char> = source.chars().collect();
    let mut text = Text::new();

    let mut line = String::new();
    let mut start_number: u32 = 1;
    let mut physical: u32 = 1;
    let mut prev = '\0';
    let mut in_string = false;

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        i += 1;

        if c == '\n' {
            physical += 1;
            flush(&mut text, &mut line, filename, start_number);
            start_number = physical;
            prev = '\0';
            in_string = false;
            continue;
        }

        if in_string {
            if c == '"' && prev != '\\' {
                in_string = false;
            }
            line.push(c);
            prev = c;
            continue;
        }

        if c == '"' {
            in_string = true;
            line.push(c);
            prev = c;
            continue;
        }

        // Collapse whitespace runs; leading whitespace vanishes entirely.
        if c.is_whitespace() && (prev.is_whitespace() || prev == '\0') {
            continue;
        }

        if c == '#' {
            flush(&mut text, &mut line, filename, start_number);
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            prev = '\0';
            continue;
        }

        // A label ends the token but not the line: whatever statement
        // follows (possibly on a later physical line) is pulled up next
        // to it.
        if c == ':' {
            line.push(':');
            line.push(' ');
            loop {
                while i < chars.len() && chars[i].is_whitespace() {
                    if chars[i] == '\n' {
                        physical += 1;
                    }
                    i += 1;
                }
                if i < chars.len() && chars[i] == '#' {
                    while i < chars.len() && chars[i] != '\n' {
                        i += 1;
                    }
                    continue;
                }
                break;
            }
            if i < chars.len() {
                line.push(chars[i]);
                i += 1;
            }
            prev = ' ';
            continue;
        }

        line.push(c);
        if c.is_whitespace() {
            line.pop();
            line.push(' ');
        }
        prev = c;
    }

    flush(&mut text, &mut line, filename, start_number);
    text
}

fn flush(text: &mut Text, line: &mut String, filename: &str, number: u32) {
    let trimmed = line.trim_end();
    if !trimmed.is_empty() {
        text.push(Line::new(filename, number, trimmed.to_owned()));
    }
    line.clear();
}

#[cfg(test)]
mod test {
    use super::*;

    fn lines(source: &str) -> Vec<(u32, String)> {
        preprocess(source, "test.s")
            .iter()
            .map(|line| (line.number, line.text.clone()))
            .collect()
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(
            lines("  add   $t0,\t$t1,  $t2  "),
            [(1, "add $t0, $t1, $t2".to_owned())]
        );
    }

    #[test]
    fn strips_comments() {
        assert_eq!(
            lines("add $t0, $t1, $t2 # sum\n# only a comment\nnop"),
            [(1, "add $t0, $t1, $t2".to_owned()), (3, "nop".to_owned())]
        );
    }

    #[test]
    fn skips_blank_lines_and_numbers_the_rest() {
        assert_eq!(
            lines("\n\nnop\n\nsyscall\n"),
            [(3, "nop".to_owned()), (5, "syscall".to_owned())]
        );
    }

    #[test]
    fn splices_label_onto_next_statement() {
        assert_eq!(
            lines("foo:\n  add $t0, $t1, $t2"),
            [(1, "foo: add $t0, $t1, $t2".to_owned())]
        );
    }

    #[test]
    fn splices_label_past_comments() {
        assert_eq!(
            lines("loop: # top of loop\n\n  nop"),
            [(1, "loop: nop".to_owned())]
        );
    }

    #[test]
    fn label_at_end_of_input() {
        assert_eq!(lines("nop\nend:"), [(1, "nop".to_owned()), (2, "end:".to_owned())]);
    }

    #[test]
    fn preserves_whitespace_inside_strings() {
        assert_eq!(
            lines(".asciiz  \"two  spaces # not a comment\""),
            [(1, ".asciiz \"two  spaces # not a comment\"".to_owned())]
        );
    }

    #[test]
    fn escaped_quote_does_not_end_string() {
        assert_eq!(
            lines(".ascii \"say \\\"hi\\\"  there\""),
            [(1, ".ascii \"say \\\"hi\\\"  there\"".to_owned())]
        );
    }
}
