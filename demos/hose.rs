use std::io::Read;

use memhose::{
  BufferCursor, BunchConfig, HoseConfig, MemPool, Memhose, Out, Snippet, StrBunch, StrFinder,
  split,
};
use tracing_subscriber::EnvFilter;

/// Waits until the user presses ENTER, when the demo runs with `--pause`.
/// Useful when you want to inspect memory state with tools like `pmap` or
/// `htop` between steps.
fn block_until_enter_pressed(pause: bool) {
  if !pause {
    return;
  }
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_hose(
  label: &str,
  hose: &Memhose,
) {
  println!(
    "[{}] bulks = {}, usable = {}, used = {} of {} bytes",
    label,
    hose.bulk_count(),
    hose.usable_bulks(),
    hose.used(),
    hose.capacity(),
  );
}

fn main() -> memhose::Result<()> {
  // RUST_LOG=memhose=trace shows every bulk and buffer the demo creates.
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let pause = std::env::args().any(|arg| arg == "--pause");

  // Small bulks so growth is visible without allocating megabytes.
  let mut hose = Memhose::with_config(0, HoseConfig::default().with_bulk_size(256))?;
  print_hose("start", &hose);
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 1) Raw allocations straight from the hose.
  // --------------------------------------------------------------------
  let first = hose.allocate(3)?;
  let second = hose.allocate(200)?;
  println!("\n[1] 3 bytes at {:?}, 200 bytes at {:?}", first, second);
  print_hose("1", &hose);

  // Does not fit in what is left of the first bulk: a new bulk is spliced in.
  let third = hose.allocate(300)?;
  println!("[1] 300 bytes at {:?}", third);
  print_hose("1", &hose);
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 2) Split a line into fields, referencing the source bytes.
  // --------------------------------------------------------------------
  let line = b"GET /index.html HTTP/1.1";
  let mut fields = Snippet::new(3)?;
  split(line, b" ", &mut fields)?;
  for (index, field) in fields.iter().enumerate() {
    println!("\n[2] field {} = {:?}", index, String::from_utf8_lossy(field));
  }
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 3) Collect path components into bunches backed by the hose.
  // --------------------------------------------------------------------
  {
    let path = b"/usr/local/share/doc";
    let config = BunchConfig::default().with_buffer_size(8);
    let mut parts = StrBunch::with_config(&hose, config);
    let mut finder = StrFinder::new(path);

    finder.find_n(b"/", -1, true, Some(&mut parts), None)?;
    finder.find_last_component(true, &mut parts)?;

    let mut cursor = BufferCursor::default();
    while let Some(buffer) = parts.next_buffer(&mut cursor) {
      println!("\n[3] copy buffer {:?}", String::from_utf8_lossy(buffer));
    }

    let required = match parts.join_by(b"::", Out::Measure) {
      Err(memhose::Error::TryAgain { required }) => required,
      other => {
        println!("[3] unexpected {:?}", other);
        0
      }
    };
    let mut joined = vec![0u8; required];
    parts.join_by(b"::", Out::fill_exact(&mut joined))?;
    println!("[3] joined ({} bytes) = {}", required, String::from_utf8_lossy(&joined));
    print_hose("3", &hose);
  }
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 4) Rewind everything. Memory stays with the hose for the next round.
  // --------------------------------------------------------------------
  hose.free_all();
  print_hose("4", &hose);

  println!("\n[5] End of example. Dropping the hose releases every bulk.");
  Ok(())
}
