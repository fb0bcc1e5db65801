#![no_main]

use libfuzzer_sys::fuzz_target;

use cachewire::protocol::Parser;

// Feed the input in two arbitrary fragments, mirroring how the worker hands
// partial reads to the parser, and keep going through resets so one input
// can exercise several commands.
fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let payload = &data[1..];
    let split = (data[0] as usize) % (payload.len() + 1);
    let (first, second) = payload.split_at(split);

    let mut parser = Parser::new();
    for fragment in [first, second] {
        let mut rest = fragment;
        loop {
            match parser.parse(rest) {
                Ok(parsed) => {
                    if parsed.command.is_some() {
                        parser.reset();
                    }
                    if parsed.consumed == 0 {
                        break;
                    }
                    rest = &rest[parsed.consumed..];
                }
                Err(_) => return,
            }
        }
    }
});
