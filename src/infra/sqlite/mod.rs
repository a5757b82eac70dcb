// SQLite backend - an in-process stand-in for MySQL used by the test suite.

mod sqlite_backend;
