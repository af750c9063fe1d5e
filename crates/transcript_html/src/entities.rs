/// Decodes character references in text and attribute values.
///
/// Unknown names and malformed references are kept literally.
pub(crate) fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp + 1..];

        match candidate.find(';') {
            Some(end) if end > 0 && end <= 32 => match decode_reference(&candidate[..end]) {
                Some(decoded) => {
                    out.push(decoded);
                    rest = &candidate[end + 1..];
                }
                None => {
                    out.push('&');
                    rest = candidate;
                }
            },
            _ => {
                out.push('&');
                rest = candidate;
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_reference(reference: &str) -> Option<char> {
    if let Some(numeric) = reference.strip_prefix('#') {
        let hex = numeric
            .strip_prefix('x')
            .or_else(|| numeric.strip_prefix('X'));
        let code = match hex {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        return Some(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
    }

    let decoded = match reference {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "hellip" => '\u{2026}',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "bull" => '\u{2022}',
        "middot" => '\u{b7}',
        "times" => '\u{d7}',
        _ => return None,
    };
    Some(decoded)
}

#[cfg(test)]
mod tests {
    use super::decode_entities;

    #[test]
    fn decodes_named_and_numeric_references() {
        assert_eq!(
            decode_entities("&lt;b&gt; &amp; &quot;x&quot; &#039;y&#39; &#x41;"),
            "<b> & \"x\" 'y' A"
        );
    }

    #[test]
    fn keeps_unknown_or_unterminated_references() {
        assert_eq!(decode_entities("fish & chips"), "fish & chips");
        assert_eq!(decode_entities("&bogus; &amp"), "&bogus; &amp");
    }

    #[test]
    fn invalid_code_points_become_replacement_characters() {
        assert_eq!(decode_entities("&#xD800;"), "\u{fffd}");
    }
}
