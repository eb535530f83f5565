use std::{
    fmt::Write as _,
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Mutex,
    thread::{self, JoinHandle},
};

use chrono::{format::DelayedFormat, DateTime, Local, NaiveDate};
use crossbeam_channel::{unbounded, Receiver, Sender};
use once_cell::sync::Lazy;

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("default"));

/// 所有已啟動的寫檔線程，`shutdown` 時逐一收尾
static WRITERS: Lazy<Mutex<Vec<Writer>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// 日誌根目錄
const LOG_DIR: &str = "log";
/// 累積超過此長度就寫入檔案
const FLUSH_THRESHOLD: usize = 4096;

enum Command {
    Write(LogMessage),
    Close,
}

struct Writer {
    name: String,
    tx: Sender<Command>,
    handle: JoinHandle<()>,
}

/// 具名的檔案 logger，寫檔由背景線程處理，呼叫端不會被 I/O 卡住
pub struct Logger {
    writer: Sender<Command>,
}

impl Logger {
    pub fn new(log_name: &str) -> Self {
        let (tx, rx) = unbounded::<Command>();
        let name = log_name.to_string();

        // 寫入檔案的操作使用另一個線程處理
        let spawned = thread::Builder::new()
            .name(format!("log-{}", log_name))
            .spawn(move || write_loop(&name, rx));

        match spawned {
            Ok(handle) => {
                let mut writers = match WRITERS.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                writers.push(Writer {
                    name: log_name.to_string(),
                    tx: tx.clone(),
                    handle,
                });
            }
            Err(why) => error_console(format!(
                "Failed to spawn the log writer for {} because {:?}",
                log_name, why
            )),
        }

        Logger { writer: tx }
    }

    pub fn info(&self, log: impl Into<String>) {
        self.send(log::Level::Info, log.into());
    }

    pub fn warn(&self, log: impl Into<String>) {
        self.send(log::Level::Warn, log.into());
    }

    pub fn error(&self, log: impl Into<String>) {
        self.send(log::Level::Error, log.into());
    }

    fn send(&self, level: log::Level, msg: String) {
        if let Err(why) = self.writer.send(Command::Write(LogMessage::new(level, msg))) {
            // 寫檔線程不在了，改寫到 console，訊息不遺失
            if let Command::Write(message) = why.into_inner() {
                error_console(format!("{} {}", message.level, message.msg));
            }
        }
    }
}

/// 通知所有寫檔線程收尾並等待它們寫完
///
/// 呼叫前已送出的訊息都會寫入檔案；之後的訊息改寫到 console。
pub fn shutdown() {
    let writers = {
        let mut guard = match WRITERS.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *guard)
    };

    for writer in &writers {
        let _ = writer.tx.send(Command::Close);
    }

    for writer in writers {
        if writer.handle.join().is_err() {
            error_console(format!("The log writer for {} panicked", writer.name));
        }
    }
}

pub struct LogMessage {
    pub level: log::Level,
    pub msg: String,
    pub created_at: DateTime<Local>,
}

impl LogMessage {
    pub fn new(level: log::Level, msg: String) -> Self {
        LogMessage {
            level,
            msg,
            created_at: Local::now(),
        }
    }
}

/// 依日期換檔的輸出檔
struct DailyFile {
    name: String,
    date: Option<NaiveDate>,
    writer: Option<BufWriter<File>>,
}

impl DailyFile {
    fn new(name: &str) -> Self {
        DailyFile {
            name: name.to_string(),
            date: None,
            writer: None,
        }
    }

    fn writer(&mut self, now: DateTime<Local>) -> Option<&mut BufWriter<File>> {
        let today = now.date_naive();
        if self.date != Some(today) {
            if let Some(mut old) = self.writer.take() {
                let _ = old.flush();
            }

            self.date = Some(today);
            self.writer = log_path(&self.name, today)
                .and_then(|path| {
                    OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&path)
                        .map_err(|why| {
                            error_console(format!(
                                "Failed to open log file {} because {:?}",
                                path.display(),
                                why
                            ))
                        })
                        .ok()
                })
                .map(BufWriter::new);
        }

        self.writer.as_mut()
    }
}

fn write_loop(name: &str, rx: Receiver<Command>) {
    let mut file = DailyFile::new(name);
    let mut line = String::with_capacity(FLUSH_THRESHOLD);
    let mut last = Local::now();

    for command in &rx {
        let received = match command {
            Command::Write(received) => received,
            Command::Close => break,
        };

        last = received.created_at;
        append_line(&mut line, &received);

        if rx.is_empty() || line.len() >= FLUSH_THRESHOLD {
            flush_line(&mut file, last, &mut line);
        }
    }

    // 收到 Close 後仍在佇列中的訊息一併寫出
    for command in rx.try_iter() {
        if let Command::Write(received) = command {
            last = received.created_at;
            append_line(&mut line, &received);
        }
    }

    if !line.is_empty() {
        flush_line(&mut file, last, &mut line);
    }
}

fn append_line(line: &mut String, received: &LogMessage) {
    let _ = writeln!(
        line,
        "{} {} {}",
        received.created_at.format("%F %X%.6f"),
        received.level,
        received.msg
    );
}

fn flush_line(file: &mut DailyFile, now: DateTime<Local>, line: &mut String) {
    match file.writer(now) {
        Some(writer) => {
            if let Err(why) = writer.write_all(line.as_bytes()).and_then(|_| writer.flush()) {
                error_console(format!(
                    "Failed to write to log file. because:{:#?}\r\nmsg:{}",
                    why, line
                ));
            }
        }
        None => info_console(line.clone()),
    }

    line.clear();
}

fn log_path(name: &str, date: NaiveDate) -> Option<PathBuf> {
    let path = Path::new(LOG_DIR);

    if !path.exists() {
        fs::create_dir_all(path).ok()?;
    }

    let mut log_path = PathBuf::from(path);
    log_path.push(format!("{}_{}.log", name, date.format("%Y-%m-%d")));

    Some(log_path)
}

pub fn info_file_async(log: impl Into<String>) {
    LOGGER.info(log);
}

pub fn warn_file_async(log: impl Into<String>) {
    LOGGER.warn(log);
}

pub fn error_file_async(log: impl Into<String>) {
    LOGGER.error(log);
}

pub fn info_console(log: String) {
    println!(
        "{} Info {}",
        Local::now().format("%Y-%m-%d %H:%M:%S.%3f"),
        log
    );
}

pub fn error_console(log: String) {
    println!(
        "{} Error {}",
        DelayedFormat::to_string(&Local::now().format("%Y-%m-%d %H:%M:%S.%3f")),
        log
    );
}
