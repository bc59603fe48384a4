/// Lowercases, folds Latin diacritics to ASCII and collapses whitespace.
/// Every extractor works on this form so accented input ("reunião às 15h")
/// matches the same patterns as plain ASCII.
pub fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_space = true;

    for c in input.chars().flat_map(fold_char) {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            for lc in c.to_lowercase() {
                out.push(lc);
            }
            last_was_space = false;
        }
    }

    while out.ends_with(' ') {
        out.pop();
    }
    out
}

fn fold_char(c: char) -> std::option::IntoIter<char> {
    let folded = match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => 'u',
        'ç' | 'Ç' => 'c',
        'ñ' | 'Ñ' => 'n',
        other => other,
    };
    Some(folded).into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_trims() {
        assert_eq!(normalize("  Hello World  "), "hello world");
    }

    #[test]
    fn folds_diacritics() {
        assert_eq!(normalize("Reunião às 15h"), "reuniao as 15h");
        assert_eq!(normalize("Orçamento"), "orcamento");
    }

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(normalize("a \t b\n\nc"), "a b c");
    }

    #[test]
    fn empty_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }
}
