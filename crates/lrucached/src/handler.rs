//! Command handler for the RESP server

use crate::resp::Frame;
use lrucache::{Cache, LruCache};
use std::sync::Arc;

/// Cache shared by every connection
pub type SharedCache = Arc<LruCache<Vec<u8>, Vec<u8>>>;

pub struct CommandHandler {
    cache: SharedCache,
}

impl CommandHandler {
    pub fn new(cache: SharedCache) -> Self {
        Self { cache }
    }

    pub fn handle(&self, cmd: Frame) -> Frame {
        let args = match cmd {
            Frame::Array(Some(args)) if !args.is_empty() => args,
            _ => return Frame::err("invalid command format"),
        };

        let command = match args[0].as_bulk() {
            Some(name) => String::from_utf8_lossy(name).to_uppercase(),
            None => return Frame::err("invalid command"),
        };

        let args = &args[1..];
        match command.as_str() {
            "PING" => self.handle_ping(args),
            "ECHO" => self.handle_echo(args),
            "GET" => self.handle_get(args),
            "SET" => self.handle_set(args),
            "DEL" => self.handle_del(args),
            "EXISTS" => self.handle_exists(args),
            "KEYS" => self.handle_keys(),
            "DBSIZE" => Frame::Integer(self.cache.len() as i64),
            "FLUSHDB" => {
                self.cache.clear();
                Frame::ok()
            }
            "INFO" => self.handle_info(),
            // redis-cli sends this on connect
            "COMMAND" => Frame::Array(Some(vec![])),
            _ => Frame::err(format!("unknown command '{}'", command)),
        }
    }

    fn handle_ping(&self, args: &[Frame]) -> Frame {
        match args {
            [] => Frame::Simple("PONG".to_string()),
            [msg] => msg.clone(),
            _ => wrong_arity("ping"),
        }
    }

    fn handle_echo(&self, args: &[Frame]) -> Frame {
        match args {
            [msg] => msg.clone(),
            _ => wrong_arity("echo"),
        }
    }

    fn handle_get(&self, args: &[Frame]) -> Frame {
        let [key] = args else {
            return wrong_arity("get");
        };
        let Some(key) = key.as_bulk() else {
            return Frame::err("invalid key type");
        };

        match self.cache.get(&key.to_vec()) {
            Some(value) => Frame::Bulk(Some(value)),
            None => Frame::null(),
        }
    }

    fn handle_set(&self, args: &[Frame]) -> Frame {
        let [key, value] = args else {
            return wrong_arity("set");
        };
        let Some(key) = key.as_bulk() else {
            return Frame::err("invalid key type");
        };
        let Some(value) = value.as_bulk() else {
            return Frame::err("invalid value type");
        };

        if self.cache.put(key.to_vec(), value.to_vec()) {
            Frame::ok()
        } else {
            Frame::err("value was not stored")
        }
    }

    fn handle_del(&self, args: &[Frame]) -> Frame {
        if args.is_empty() {
            return wrong_arity("del");
        }

        let deleted = args
            .iter()
            .filter_map(Frame::as_bulk)
            .filter(|key| self.cache.remove(&key.to_vec()).is_some())
            .count();

        Frame::Integer(deleted as i64)
    }

    fn handle_exists(&self, args: &[Frame]) -> Frame {
        if args.is_empty() {
            return wrong_arity("exists");
        }

        // Membership checks do not count as a use
        let count = args
            .iter()
            .filter_map(Frame::as_bulk)
            .filter(|key| self.cache.contains(&key.to_vec()))
            .count();

        Frame::Integer(count as i64)
    }

    fn handle_keys(&self) -> Frame {
        let keys = self
            .cache
            .keys()
            .into_iter()
            .map(|key| Frame::Bulk(Some(key)))
            .collect();
        Frame::Array(Some(keys))
    }

    fn handle_info(&self) -> Frame {
        let stats = self.cache.stats();
        let info = format!(
            "# Server\r\n\
             lrucached_version:{}\r\n\
             \r\n\
             # Stats\r\n\
             cache_size:{}\r\n\
             cache_capacity:{}\r\n\
             cache_hits:{}\r\n\
             cache_misses:{}\r\n\
             cache_inserts:{}\r\n\
             cache_updates:{}\r\n\
             cache_evictions:{}\r\n\
             cache_hit_ratio:{:.2}\r\n",
            env!("CARGO_PKG_VERSION"),
            self.cache.len(),
            self.cache.capacity(),
            stats.hits(),
            stats.misses(),
            stats.inserts(),
            stats.updates(),
            stats.evictions(),
            stats.hit_ratio(),
        );
        Frame::Bulk(Some(info.into_bytes()))
    }
}

fn wrong_arity(command: &str) -> Frame {
    Frame::err(format!(
        "wrong number of arguments for '{}' command",
        command
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(capacity: usize) -> CommandHandler {
        CommandHandler::new(Arc::new(LruCache::new(capacity).unwrap()))
    }

    fn cmd(parts: &[&str]) -> Frame {
        Frame::Array(Some(
            parts
                .iter()
                .map(|p| Frame::Bulk(Some(p.as_bytes().to_vec())))
                .collect(),
        ))
    }

    fn bulk(s: &str) -> Frame {
        Frame::Bulk(Some(s.as_bytes().to_vec()))
    }

    #[test]
    fn test_ping() {
        let handler = handler(10);
        assert_eq!(
            handler.handle(cmd(&["PING"])),
            Frame::Simple("PONG".to_string())
        );
        assert_eq!(handler.handle(cmd(&["ping", "hi"])), bulk("hi"));
    }

    #[test]
    fn test_echo() {
        let handler = handler(10);
        assert_eq!(handler.handle(cmd(&["ECHO", "hello"])), bulk("hello"));
        assert!(matches!(handler.handle(cmd(&["ECHO"])), Frame::Error(_)));
    }

    #[test]
    fn test_set_and_get() {
        let handler = handler(10);

        assert_eq!(handler.handle(cmd(&["SET", "mykey", "myvalue"])), Frame::ok());
        assert_eq!(handler.handle(cmd(&["GET", "mykey"])), bulk("myvalue"));
        assert_eq!(handler.handle(cmd(&["GET", "missing"])), Frame::null());
    }

    #[test]
    fn test_eviction_through_commands() {
        let handler = handler(2);

        handler.handle(cmd(&["SET", "1", "a"]));
        handler.handle(cmd(&["SET", "2", "b"]));
        handler.handle(cmd(&["GET", "1"]));
        handler.handle(cmd(&["SET", "3", "c"]));

        assert_eq!(handler.handle(cmd(&["GET", "2"])), Frame::null());
        assert_eq!(handler.handle(cmd(&["GET", "3"])), bulk("c"));
        assert_eq!(handler.handle(cmd(&["DBSIZE"])), Frame::Integer(2));
        assert_eq!(
            handler.handle(cmd(&["KEYS"])),
            Frame::Array(Some(vec![bulk("3"), bulk("1")]))
        );
    }

    #[test]
    fn test_del_and_exists() {
        let handler = handler(10);

        handler.handle(cmd(&["SET", "a", "1"]));
        handler.handle(cmd(&["SET", "b", "2"]));

        assert_eq!(
            handler.handle(cmd(&["EXISTS", "a", "b", "c"])),
            Frame::Integer(2)
        );
        assert_eq!(handler.handle(cmd(&["DEL", "a", "c"])), Frame::Integer(1));
        assert_eq!(handler.handle(cmd(&["EXISTS", "a"])), Frame::Integer(0));
    }

    #[test]
    fn test_flushdb() {
        let handler = handler(10);

        handler.handle(cmd(&["SET", "a", "1"]));
        assert_eq!(handler.handle(cmd(&["FLUSHDB"])), Frame::ok());
        assert_eq!(handler.handle(cmd(&["DBSIZE"])), Frame::Integer(0));
    }

    #[test]
    fn test_info_reports_stats() {
        let handler = handler(10);

        handler.handle(cmd(&["SET", "a", "1"]));
        handler.handle(cmd(&["GET", "a"]));
        handler.handle(cmd(&["GET", "b"]));

        let Frame::Bulk(Some(info)) = handler.handle(cmd(&["INFO"])) else {
            panic!("Expected bulk string");
        };
        let info = String::from_utf8(info).unwrap();
        assert!(info.contains("cache_capacity:10\r\n"));
        assert!(info.contains("cache_hits:1\r\n"));
        assert!(info.contains("cache_misses:1\r\n"));
        assert!(info.contains("cache_hit_ratio:0.50\r\n"));
    }

    #[test]
    fn test_bad_input() {
        let handler = handler(10);

        assert!(matches!(handler.handle(Frame::Integer(1)), Frame::Error(_)));
        assert!(matches!(
            handler.handle(Frame::Array(Some(vec![]))),
            Frame::Error(_)
        ));
        assert!(matches!(handler.handle(cmd(&["NOPE"])), Frame::Error(_)));
        assert!(matches!(
            handler.handle(cmd(&["SET", "only-key"])),
            Frame::Error(_)
        ));
        assert!(matches!(
            handler.handle(Frame::Array(Some(vec![bulk("GET"), Frame::Integer(1)]))),
            Frame::Error(_)
        ));
    }
}
