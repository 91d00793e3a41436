mod persistence_tests;
