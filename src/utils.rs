#[allow(clippy::many_single_char_names)]
pub fn parse_triplet<T: std::str::FromStr>(s: &str) -> Result<(T, T, T), String> {
    let v = s.split(',').collect::<Vec<_>>();
    if v.len() != 3 {
        return Err(format!("expected three comma-separated values, got `{s}`"));
    }
    let x = v[0].trim().parse().map_err(|_| format!("could not parse `{}`", v[0]))?;
    let y = v[1].trim().parse().map_err(|_| format!("could not parse `{}`", v[1]))?;
    let z = v[2].trim().parse().map_err(|_| format!("could not parse `{}`", v[2]))?;
    Ok((x, y, z))
}

/// Group numeric digits to facilitate reading long numbers
pub fn group_digits<F: std::fmt::Display>(n: F) -> String {
    use numsep::{separate, Locale};
    separate(n, Locale::English)
}

pub mod timing {

    use super::group_digits;
    use std::io::Write;
    use std::time::Instant;

    pub struct Progress {
        previous: Instant,
    }

    impl Progress {

        #[allow(clippy::new_without_default)]
        pub fn new() -> Self { Self { previous: Instant::now() } }

        /// Print message, append ellipsis, flush stdout, stay on same line, start timer.
        pub fn start(&mut self, message: &str) {
            print!("{message} ... ");
            std::io::stdout().flush().unwrap();
            self.start_timer();
        }

        // Print time elapsed since last start or done
        pub fn done(&mut self) {
            println!("{} ms", group_digits(self.previous.elapsed().as_millis()));
            self.start_timer();
        }

        // Print message followed by time elapsed since last start or done
        pub fn done_with_message(&mut self, message: &str) {
            println!("{message}: {} ms",
                     group_digits(self.previous.elapsed().as_millis()));
            self.start_timer();
        }

        fn start_timer(&mut self) { self.previous = Instant::now() }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    #[test]
    fn triplet_parses_and_rejects() {
        assert_eq!(parse_triplet::<usize>("32,32,64"), Ok((32, 32, 64)));
        assert_eq!(parse_triplet::<f32>("1.5, 2.0, 3.0"), Ok((1.5, 2.0, 3.0)));
        assert!(parse_triplet::<usize>("1,2").is_err());
        assert!(parse_triplet::<usize>("a,b,c").is_err());
    }
}
