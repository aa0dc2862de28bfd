use std::io::Write as _;
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Starts the terminal output thread. All stderr output (progress line, log
/// lines, interactive prompts) funnels through it so the progress line never
/// interleaves with other text.
pub(crate) fn init(start: Instant, enable_progress: bool) -> Handle {
    let (sender, receiver) = mpsc::channel();

    let join_handle = std::thread::Builder::new()
        .name("term out".into())
        .spawn(move || thread_main(start, enable_progress, receiver))
        .expect("failed to spawn thread");

    Handle {
        join_handle,
        sender,
    }
}

const UPDATE_PERIOD: Duration = Duration::from_millis(100);

enum Command {
    Finish,
    PrintRawLine(Vec<u8>),
    SetProgress(String),
    FreezeProgress,
}

fn thread_main(start: Instant, enable_progress: bool, receiver: mpsc::Receiver<Command>) {
    let mut shown = false;
    let mut current = String::new();
    let mut last_render = start;
    let mut rendered_any = false;
    let mut stderr = std::io::stderr();

    fn clear_line(stderr: &mut std::io::Stderr, shown: &mut bool) {
        if *shown {
            handle_err(crossterm::queue!(
                stderr,
                crossterm::cursor::MoveToColumn(0),
                crossterm::terminal::Clear(crossterm::terminal::ClearType::CurrentLine),
            ));
            *shown = false;
        }
    }

    loop {
        match receiver.recv() {
            Ok(Command::SetProgress(progress)) => {
                current = progress;
                if enable_progress && (!rendered_any || last_render.elapsed() >= UPDATE_PERIOD) {
                    clear_line(&mut stderr, &mut shown);
                    handle_err(crossterm::queue!(
                        stderr,
                        crossterm::style::Print(render_line(start, &current)),
                    ));
                    handle_err(stderr.flush());
                    shown = true;
                    rendered_any = true;
                    last_render = Instant::now();
                }
            }
            Ok(Command::PrintRawLine(line)) => {
                clear_line(&mut stderr, &mut shown);
                handle_err(stderr.write_all(&line));
                handle_err(stderr.flush());
            }
            Ok(Command::FreezeProgress) => {
                // Leave the final progress state on screen as a plain line.
                clear_line(&mut stderr, &mut shown);
                if enable_progress && !current.is_empty() {
                    handle_err(stderr.write_all(render_line(start, &current).as_bytes()));
                    handle_err(stderr.write_all(b"\n"));
                    handle_err(stderr.flush());
                }
                current.clear();
            }
            Ok(Command::Finish) | Err(mpsc::RecvError) => {
                clear_line(&mut stderr, &mut shown);
                handle_err(stderr.flush());
                break;
            }
        }
    }
}

fn render_line(start: Instant, line: &str) -> String {
    let elapsed = start.elapsed().as_secs();
    let secs = elapsed % 60;
    let mins = (elapsed / 60) % 60;
    let hours = elapsed / 3600;
    format!("[{hours:02}:{mins:02}:{secs:02}] {line}")
}

fn handle_err<T>(r: std::io::Result<T>) -> T {
    r.expect("stderr write failed")
}

pub(crate) struct Handle {
    join_handle: std::thread::JoinHandle<()>,
    sender: mpsc::Sender<Command>,
}

impl Handle {
    pub(crate) fn finish(self) {
        self.sender
            .send(Command::Finish)
            .expect("term out endpoint closed");
        self.join_handle.join().expect("term out thread panicked");
    }

    pub(crate) fn get_progress_print(&self) -> ProgressPrint {
        ProgressPrint {
            sender: self.sender.clone(),
        }
    }
}

/// Cheap cloneable handle used by the pipeline, the logger, and the console
/// interaction. Sends never fail hard: once the terminal thread is gone the
/// output is simply dropped.
#[derive(Clone)]
pub(crate) struct ProgressPrint {
    sender: mpsc::Sender<Command>,
}

impl ProgressPrint {
    pub(crate) fn set_progress(&self, progress: String) {
        let _ = self.sender.send(Command::SetProgress(progress));
    }

    pub(crate) fn freeze_progress(&self) {
        let _ = self.sender.send(Command::FreezeProgress);
    }

    pub(crate) fn print_raw_line(&self, line: Vec<u8>) {
        let _ = self.sender.send(Command::PrintRawLine(line));
    }
}
